//! icinga2-usersyncd - keeps one Icinga 2 ApiUser per Host
//!
//! The binary wires the command line, logging, and signal handling around
//! [`usersyncd_sync::Daemon`]. The pieces live here so they can be tested.

pub mod cli;
pub mod logging;
