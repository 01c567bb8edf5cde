pub(crate) mod arena;
pub(crate) mod bootstrap;
pub(crate) mod loop_runner;
pub(crate) mod scene;
pub(crate) mod script;
