mod delta;
mod parse;
mod render;

pub use delta::{extract_delta, Delta, TranscriptError};
pub use parse::{parse_lines, Message, Role, ToolUse};
pub use render::{floor_char_boundary, truncate_tail, Conversation, ToolActivity};
