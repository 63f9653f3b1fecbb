pub(crate) mod net;
pub(crate) mod scoped_timer;
pub(crate) mod unique;
