//! Runtime module: logging bootstrap and state creation.

pub mod boot;
