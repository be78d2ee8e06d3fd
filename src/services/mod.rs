pub(crate) mod access_resolver;
pub(crate) mod attempts;
pub(crate) mod errors;
pub(crate) mod grading;
pub(crate) mod grants;
pub(crate) mod invite_codes;
pub(crate) mod questions;
pub(crate) mod results;
pub(crate) mod scoring;
pub(crate) mod test_lifecycle;

pub(crate) use errors::ServiceError;
