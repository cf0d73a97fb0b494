//! Source document expansion.
//!
//! The surrounding build hands each source unit through this tool before
//! compiling it. Directives of the form `<?stow prefix.name args?>` are
//! replaced with generated fragments; everything else, including directives
//! this tool does not recognize, passes through byte for byte.

use tracing::debug;

use crate::pragma::{self, PragmaContext};

/// Opens a directive aimed at this tool.
pub const DIRECTIVE_OPEN: &str = "<?stow";
const DIRECTIVE_CLOSE: &str = "?>";

/// Expand every recognized directive in `source`.
pub fn expand_document(ctx: &mut PragmaContext<'_>, source: &str) -> String {
    let mut out = String::with_capacity(source.len());
    let mut rest = source;

    while let Some(start) = rest.find(DIRECTIVE_OPEN) {
        out.push_str(&rest[..start]);
        let directive_start = &rest[start..];
        let after_open = &directive_start[DIRECTIVE_OPEN.len()..];

        // `<?stowage ...` is someone else's instruction
        if !after_open.starts_with([' ', '\t', '\r', '\n']) {
            out.push_str(DIRECTIVE_OPEN);
            rest = after_open;
            continue;
        }

        let Some(close) = after_open.find(DIRECTIVE_CLOSE) else {
            // unterminated; pass the remainder through untouched
            out.push_str(directive_start);
            return out;
        };

        let body = after_open[..close].trim();
        let (name, raw_args) = body.split_once(char::is_whitespace).unwrap_or((body, ""));
        let (prefix, op) = name.split_once('.').unwrap_or(("", name));

        debug!("expanding directive {prefix}.{op}");
        if !pragma::process(ctx, prefix, op, raw_args, &mut out) {
            let full_len = DIRECTIVE_OPEN.len() + close + DIRECTIVE_CLOSE.len();
            out.push_str(&directive_start[..full_len]);
        }
        rest = &after_open[close + DIRECTIVE_CLOSE.len()..];
    }

    out.push_str(rest);
    out
}
