pub mod authorization_request;
pub mod credential_format;
pub mod input_descriptor;
pub mod object;
pub mod presentation_definition;
pub mod presentation_submission;
pub mod response;
pub mod util;
