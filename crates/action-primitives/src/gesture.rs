//! Input gestures dispatched against a resolved node
//!
//! Some front-end frameworks only react to genuine pointer sequences, so a
//! click is always the full pointerdown/mousedown/pointerup/mouseup/click run.

use crate::{dom::DomPort, errors::ActionError, types::SyntheticEvent};
use promptrelay_core_types::{NodeRef, Point};
use tracing::debug;

/// Full pointer click at the node's visual center. Returns the point used.
pub async fn pointer_click(dom: &dyn DomPort, node: NodeRef) -> Result<Point, ActionError> {
    let probe = dom.probe(node).await?;
    let point = probe.rect.center();
    debug!(%node, x = point.x, y = point.y, "pointer click");

    let sequence = [
        SyntheticEvent::PointerDown { point },
        SyntheticEvent::MouseDown { point },
        SyntheticEvent::PointerUp { point },
        SyntheticEvent::MouseUp { point },
        SyntheticEvent::Click { point },
    ];
    for event in sequence {
        dom.dispatch(node, event).await?;
    }
    Ok(point)
}

/// Focus, replace the value, then announce it with an input event
pub async fn fill_text(dom: &dyn DomPort, node: NodeRef, text: &str) -> Result<(), ActionError> {
    dom.dispatch(node, SyntheticEvent::Focus).await?;
    dom.set_value(node, text).await?;
    dom.dispatch(
        node,
        SyntheticEvent::Input {
            data: text.to_string(),
        },
    )
    .await
}

pub async fn press_key(dom: &dyn DomPort, node: NodeRef, key: &str) -> Result<(), ActionError> {
    dom.dispatch(node, SyntheticEvent::KeyDown { key: key.to_string() })
        .await?;
    dom.dispatch(node, SyntheticEvent::KeyUp { key: key.to_string() })
        .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::{ElementSpec, MemoryDom};

    #[tokio::test]
    async fn click_dispatches_full_pointer_sequence_at_center() {
        let dom = MemoryDom::new();
        let button = dom
            .append(dom.body(), ElementSpec::new("button").rect(20.0, 40.0, 60.0, 20.0))
            .unwrap();
        let point = pointer_click(dom.as_ref(), button).await.unwrap();
        assert_eq!(point, Point::new(50.0, 50.0));
        assert_eq!(
            dom.event_names(button),
            vec!["pointerdown", "mousedown", "pointerup", "mouseup", "click"]
        );
    }

    #[tokio::test]
    async fn fill_text_focuses_and_sets_value() {
        let dom = MemoryDom::new();
        let input = dom.append(dom.body(), ElementSpec::new("textarea")).unwrap();
        fill_text(dom.as_ref(), input, "Summarise this").await.unwrap();
        press_key(dom.as_ref(), input, "Enter").await.unwrap();
        assert_eq!(dom.focused(), Some(input));
        assert_eq!(dom.value(input).as_deref(), Some("Summarise this"));
        assert_eq!(
            dom.event_names(input),
            vec!["focus", "input", "keydown", "keyup"]
        );
    }

    #[tokio::test]
    async fn unknown_node_is_reported() {
        let dom = MemoryDom::new();
        let err = pointer_click(dom.as_ref(), NodeRef(4242)).await.unwrap_err();
        assert_eq!(err.code(), "UNKNOWN_NODE");
    }
}
