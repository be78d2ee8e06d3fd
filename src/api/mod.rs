pub(crate) mod access;
pub(crate) mod attempts;
pub(crate) mod catalog;
pub(crate) mod errors;
pub(crate) mod guards;
pub(crate) mod handlers;
pub(crate) mod router;
