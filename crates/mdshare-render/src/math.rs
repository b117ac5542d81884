//! Math typesetting: `language-math` code spans become MathML.
//!
//! Inline math arrives as `<code class="language-math">`, display math as the
//! same element wrapped in `<pre>`. Expressions that fail to convert stay as
//! they are, so the reader still sees the source.

use tracing::debug;

use crate::dom::{self, Element, Node};
use crate::{Error, Result};

const MATH_CLASS: &str = "language-math";

/// What the converter prints in place of a construct it can't parse.
const PARSE_ERROR_MARKER: &str = "[PARSE ERROR";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Display {
    Inline,
    Block,
}

/// Replace every math span in the tree with its MathML rendering.
pub(crate) fn typeset_math(nodes: &mut [Node]) {
    for node in nodes.iter_mut() {
        let Node::Element(el) = node else {
            continue;
        };
        let converted = if let Some(tex) = display_math(el) {
            render(&tex, Display::Block)
        } else if el.tag == "code" && el.has_class(MATH_CLASS) {
            render(&code_text(el), Display::Inline)
        } else {
            typeset_math(&mut el.children);
            continue;
        };
        if let Some(mathml) = converted {
            *node = Node::raw(mathml);
        }
    }
}

/// The TeX source of a `<pre><code class="language-math">` block.
fn display_math(el: &Element) -> Option<String> {
    if el.tag != "pre" {
        return None;
    }
    let mut elements = el.children.iter().filter_map(|child| match child {
        Node::Element(child) => Some(child),
        _ => None,
    });
    let code = elements.next()?;
    if elements.next().is_some() || code.tag != "code" || !code.has_class(MATH_CLASS) {
        return None;
    }
    Some(code_text(code))
}

fn code_text(el: &Element) -> String {
    el.children.iter().map(Node::text_content).collect()
}

fn render(tex: &str, display: Display) -> Option<String> {
    match to_mathml(tex.trim(), display).and_then(|mathml| reserialize(&mathml)) {
        Ok(mathml) => Some(mathml),
        Err(e) => {
            debug!(error = %e, "math left as source");
            None
        }
    }
}

/// Round-trip converter output through the HTML parser so stray `<` and `&`
/// in operators come out escaped.
fn reserialize(mathml: &str) -> Result<String> {
    if mathml.contains(PARSE_ERROR_MARKER) {
        return Err(Error::Math("unparsed construct in expression".to_string()));
    }
    Ok(dom::to_html(&dom::parse_fragment(mathml)?))
}

#[cfg(feature = "math")]
fn to_mathml(tex: &str, display: Display) -> Result<String> {
    use latex2mathml::{DisplayStyle, latex_to_mathml};
    use std::panic::{AssertUnwindSafe, catch_unwind};

    let style = match display {
        Display::Inline => DisplayStyle::Inline,
        Display::Block => DisplayStyle::Block,
    };
    catch_unwind(AssertUnwindSafe(|| latex_to_mathml(tex, style)))
        .map_err(|_| Error::Math("converter panicked".to_string()))?
        .map_err(|e| Error::Math(e.to_string()))
}

#[cfg(not(feature = "math"))]
fn to_mathml(_tex: &str, _display: Display) -> Result<String> {
    Err(Error::Math("math support not enabled".to_string()))
}
