//! HTTP front door: routes `/{role}/{tenant}/...` requests onto the worker fleet.

pub mod app;
