//! Builder macros for expression trees.

mod lambda;
