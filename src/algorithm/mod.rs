//! This module contains general-purpose algorithms consumed by the comparator
//! as black boxes.

pub mod assignment;
