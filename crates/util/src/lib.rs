pub mod http;
pub mod template;
pub mod text_processing;

pub use http::{HttpExecError, JsonParseError, send_option_request};
pub use template::{interpolate, interpolate_value, lookup_path, value_to_text};
pub use text_processing::{redact_sensitive, strip_markup};
