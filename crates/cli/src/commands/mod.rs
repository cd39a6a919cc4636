pub(crate) mod check;
pub(crate) mod compose;
pub(crate) mod list;
