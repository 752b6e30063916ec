//! YAML page fixtures
//!
//! A fixture describes a chat page as an element tree plus scripted click
//! behaviour, so the engine can be exercised end to end without a browser:
//!
//! ```yaml
//! url: https://chat.example/
//! elements:
//!   - tag: textarea
//!     rect: [0, 700, 600, 60]
//!   - tag: button
//!     attrs: { aria-label: Send }
//!     rect: [620, 700, 60, 60]
//!     on_click:
//!       - { do: append, element: { tag: button, attrs: { aria-label: Stop } } }
//!       - { do: wait, ms: 1500 }
//!       - { do: remove, selector: 'button[aria-label="Stop"]' }
//!       - { do: append, element: { tag: div, class: response, text: "Hello!" } }
//! ```

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use action_primitives::{ElementSpec, MemoryDom};
use anyhow::{bail, Context, Result};
use extensions_bridge::MemoryClipboard;
use promptrelay_core_types::NodeRef;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PageFixture {
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default = "default_ready_state")]
    pub ready_state: String,
    #[serde(default)]
    pub elements: Vec<ElementDef>,
}

fn default_ready_state() -> String {
    "complete".to_string()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ElementDef {
    pub tag: String,
    #[serde(default)]
    pub id: Option<String>,
    /// Space-separated class list
    #[serde(default)]
    pub class: Option<String>,
    #[serde(default)]
    pub attrs: BTreeMap<String, String>,
    #[serde(default)]
    pub text: Option<String>,
    /// `[x, y, width, height]`
    #[serde(default)]
    pub rect: Option<[f64; 4]>,
    #[serde(default)]
    pub hidden: bool,
    #[serde(default)]
    pub z_index: Option<i32>,
    #[serde(default)]
    pub children: Vec<ElementDef>,
    #[serde(default)]
    pub on_click: Vec<PageAction>,
}

/// One step of a click script; steps run in order
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "do", rename_all = "snake_case")]
pub enum PageAction {
    Append {
        /// Parent selector; the body when omitted
        #[serde(default)]
        parent: Option<String>,
        element: ElementDef,
    },
    Remove {
        selector: String,
    },
    SetAttribute {
        selector: String,
        name: String,
        value: String,
    },
    RemoveAttribute {
        selector: String,
        name: String,
    },
    SetText {
        selector: String,
        text: String,
    },
    /// Page-initiated clipboard write, as a copy button performs
    Clipboard {
        text: String,
    },
    Wait {
        ms: u64,
    },
}

impl PageFixture {
    pub fn from_yaml(source: &str) -> Result<Self> {
        serde_yaml::from_str(source).context("Failed to parse page fixture")
    }

    pub async fn load(path: &Path) -> Result<Self> {
        let content = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read fixture {}", path.display()))?;
        Self::from_yaml(&content)
    }

    /// Materialise the page. Click scripts write to `clipboard` when given.
    pub fn build(&self, clipboard: Option<Arc<MemoryClipboard>>) -> Result<Arc<MemoryDom>> {
        let dom = MemoryDom::new();
        if let Some(url) = &self.url {
            dom.set_location(url.clone(), self.ready_state.clone());
        }
        let script_env = ScriptEnv { clipboard };
        for element in &self.elements {
            append_tree(&dom, dom.body(), element, &script_env)?;
        }
        Ok(dom)
    }
}

#[derive(Clone)]
struct ScriptEnv {
    clipboard: Option<Arc<MemoryClipboard>>,
}

fn spec_for(def: &ElementDef) -> ElementSpec {
    let mut spec = ElementSpec::new(def.tag.clone());
    if let Some(id) = &def.id {
        spec = spec.id(id.clone());
    }
    if let Some(class) = &def.class {
        spec = spec.class(class.clone());
    }
    for (name, value) in &def.attrs {
        spec = spec.attr(name.clone(), value.clone());
    }
    if let Some(text) = &def.text {
        spec = spec.text(text.clone());
    }
    if let Some([x, y, width, height]) = def.rect {
        spec = spec.rect(x, y, width, height);
    }
    if def.hidden {
        spec = spec.hidden();
    }
    if let Some(z_index) = def.z_index {
        spec = spec.z_index(z_index);
    }
    spec
}

fn append_tree(
    dom: &Arc<MemoryDom>,
    parent: NodeRef,
    def: &ElementDef,
    env: &ScriptEnv,
) -> Result<NodeRef> {
    let node = dom
        .append(parent, spec_for(def))
        .with_context(|| format!("Failed to append <{}>", def.tag))?;
    if !def.on_click.is_empty() {
        let script: Arc<[PageAction]> = def.on_click.clone().into();
        let env = env.clone();
        dom.on(node, "click", move |page, _| {
            run_script(page.clone(), env.clone(), script.clone(), 0);
        });
    }
    for child in &def.children {
        append_tree(dom, node, child, env)?;
    }
    Ok(node)
}

/// Apply steps from `from` on; a `wait` hands the rest to a timer task.
fn run_script(page: Arc<MemoryDom>, env: ScriptEnv, script: Arc<[PageAction]>, from: usize) {
    for (index, action) in script.iter().enumerate().skip(from) {
        if let PageAction::Wait { ms } = action {
            let ms = *ms;
            tokio::spawn(async move {
                tokio::time::sleep(Duration::from_millis(ms)).await;
                run_script(page, env, script, index + 1);
            });
            return;
        }
        if let Err(err) = apply(&page, &env, action) {
            warn!(error = %err, "fixture script step failed");
        }
    }
}

fn apply(page: &Arc<MemoryDom>, env: &ScriptEnv, action: &PageAction) -> Result<()> {
    debug!(?action, "fixture step");
    let select = |selector: &str| {
        page.find(selector)
            .with_context(|| format!("no element matches `{}`", selector))
    };
    match action {
        PageAction::Append { parent, element } => {
            let parent = match parent {
                Some(selector) => select(selector)?,
                None => page.body(),
            };
            append_tree(page, parent, element, env)?;
        }
        PageAction::Remove { selector } => page.remove(select(selector)?)?,
        PageAction::SetAttribute {
            selector,
            name,
            value,
        } => page.set_attribute(select(selector)?, name, value.clone())?,
        PageAction::RemoveAttribute { selector, name } => {
            page.remove_attribute(select(selector)?, name)?
        }
        PageAction::SetText { selector, text } => page.set_text(select(selector)?, text.clone())?,
        PageAction::Clipboard { text } => match &env.clipboard {
            Some(clipboard) => clipboard.set_content(text.clone()),
            None => bail!("fixture writes to a clipboard the host does not offer"),
        },
        PageAction::Wait { .. } => {}
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use action_primitives::DomPort;
    use extensions_bridge::MemoryHost;
    use tokio::sync::broadcast;

    const PAGE: &str = r#"
url: https://chat.example/
elements:
  - tag: main
    children:
      - tag: textarea
        id: prompt
        rect: [0, 700, 600, 60]
  - tag: button
    class: send
    rect: [620, 700, 60, 60]
    on_click:
      - { do: append, element: { tag: div, class: stop } }
      - { do: wait, ms: 800 }
      - { do: remove, selector: div.stop }
      - { do: clipboard, text: "copied" }
"#;

    #[test]
    fn nested_elements_are_built() {
        let fixture = PageFixture::from_yaml(PAGE).unwrap();
        let dom = fixture.build(None).unwrap();
        assert!(dom.find("main > textarea#prompt").is_some());
        let liveness = tokio_test::block_on(dom.liveness()).unwrap();
        assert_eq!(liveness.url.as_deref(), Some("https://chat.example/"));
        assert_eq!(liveness.ready_state.as_deref(), Some("complete"));
    }

    #[tokio::test(start_paused = true)]
    async fn click_script_runs_steps_across_waits() {
        let host = MemoryHost::new(broadcast::channel(8).0);
        let clipboard = host.memory_clipboard().unwrap();
        let dom = PageFixture::from_yaml(PAGE)
            .unwrap()
            .build(Some(clipboard.clone()))
            .unwrap();
        let send = dom.find("button.send").unwrap();

        action_primitives::pointer_click(dom.as_ref(), send).await.unwrap();
        assert!(dom.find("div.stop").is_some());
        assert_eq!(clipboard.content(), "");

        tokio::time::sleep(Duration::from_millis(801)).await;
        assert!(dom.find("div.stop").is_none());
        assert_eq!(clipboard.content(), "copied");
    }

    #[test]
    fn unknown_step_is_a_parse_error() {
        let err = PageFixture::from_yaml(
            "elements:\n  - tag: button\n    on_click:\n      - { do: explode }\n",
        )
        .unwrap_err();
        assert!(err.to_string().contains("fixture"));
    }
}
