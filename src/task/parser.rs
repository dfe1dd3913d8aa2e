//! Extraction of named code fragments from a generator reply.
//!
//! A fragment is a fenced block whose info string carries a language and a
//! name, e.g. ```` ```rhai main ````. The closing fence must repeat the
//! opening fence exactly (three or four backticks) on its own line.

use once_cell::sync::Lazy;
use regex::Regex;

use crate::execution::CodeBlocks;

// The regex crate has no backreferences, so each fence length gets its own
// branch; the four-backtick branch comes first.
static FENCED: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?ms)^````(\w+)\s+([\w\-.]+)\n(.*?)^````[ \t]*$|^```(\w+)\s+([\w\-.]+)\n(.*?)^```[ \t]*$",
    )
    .expect("fragment pattern is valid")
});

/// Named fragments in order of appearance; a repeated name keeps the last body.
pub fn parse_reply(reply: &str) -> CodeBlocks {
    let mut blocks = CodeBlocks::new();
    for caps in FENCED.captures_iter(reply) {
        let (name, body) = match (caps.get(2), caps.get(3)) {
            (Some(name), Some(body)) => (name, body),
            _ => match (caps.get(5), caps.get(6)) {
                (Some(name), Some(body)) => (name, body),
                _ => continue,
            },
        };
        blocks.insert(
            name.as_str().to_string(),
            body.as_str().trim_end_matches('\n').to_string(),
        );
    }
    blocks
}
