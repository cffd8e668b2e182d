mod common;
mod lifecycle;
mod registry;
