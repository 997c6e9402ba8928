//! GATT service registry and notification dispatcher for vendor BLE stacks.
//!
//! A peripheral application registers its custom 128-bit services and their
//! characteristics with the stack through a [`Registry`], feeds every stack
//! event to [`ServiceCtx::handle_event`], and pushes new characteristic values
//! to the connected client with [`ServiceCtx::publish`]. The stack itself is
//! reached only through the [`Stack`] trait, which [`sim::SimStack`]
//! implements in memory for tests.

#![warn(missing_debug_implementations)]
#![warn(non_ascii_idents)]
#![warn(single_use_lifetimes)]
#![warn(unused_crate_dependencies)]
#![warn(unused_extern_crates)]
#![warn(unused_import_braces)]
#![warn(unused_lifetimes)]
#![warn(unused_qualifications)]
#![warn(variant_size_differences)]
#![warn(clippy::cargo)]
#![warn(clippy::nursery)]
#![warn(clippy::pedantic)]
#![allow(clippy::enum_glob_use)]
#![allow(clippy::inline_always)]
#![allow(clippy::module_name_repetitions)]
// #![warn(clippy::restriction)]
#![warn(clippy::assertions_on_result_states)]
#![warn(clippy::clone_on_ref_ptr)]
#![warn(clippy::dbg_macro)]
#![warn(clippy::decimal_literal_representation)]
#![warn(clippy::empty_drop)]
#![warn(clippy::empty_structs_with_brackets)]
#![warn(clippy::exhaustive_enums)]
#![warn(clippy::exit)]
#![warn(clippy::format_push_string)]
#![warn(clippy::get_unwrap)]
#![warn(clippy::if_then_some_else_none)]
#![warn(clippy::mixed_read_write_in_expression)]
#![warn(clippy::mod_module_files)]
#![warn(clippy::mutex_atomic)]
#![warn(clippy::print_stdout)]
#![warn(clippy::rc_buffer)]
#![warn(clippy::rc_mutex)]
#![warn(clippy::rest_pat_in_fully_bound_structs)]
#![warn(clippy::str_to_string)]
#![warn(clippy::string_add)]
#![warn(clippy::string_to_string)]
#![warn(clippy::todo)]
#![warn(clippy::try_err)]
#![warn(clippy::unnecessary_self_imports)]
#![warn(clippy::unneeded_field_pattern)]
#![warn(clippy::unseparated_literal_suffix)]

pub use {
    config::{Config, ConfigError, RetryPolicy},
    conn::{ConnState, ConnTracker},
    consts::*,
    event::{Handler, StackEvent, Write},
    handle::{CharHandles, ConnHandle, Handle},
    notify::{Backoff, Delivery, NotifyError},
    perm::{Perms, SecLevel},
    registry::{CharDesc, CharEntry, Registry, RegistrationError, ServiceDef, ServiceDesc},
    service::ServiceCtx,
    shared::SharedCtx,
    stack::{CharAttr, HvxParams, Stack, StackError},
    uuid::{ShortUuid, Uuid, UuidType},
};

pub mod config;
pub mod conn;
pub mod consts;
pub mod event;
pub mod handle;
pub mod notify;
pub mod perm;
pub mod registry;
mod service;
pub mod shared;
pub mod sim;
pub mod stack;
mod util;
pub mod uuid;

type SyncMutex<T> = parking_lot::Mutex<T>;
type SyncMutexGuard<'a, T> = parking_lot::MutexGuard<'a, T>;

/// Error type returned by the service layer.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Registration(#[from] RegistrationError),
    #[error(transparent)]
    Notify(#[from] NotifyError),
}

/// Common service result type.
pub type Result<T> = std::result::Result<T, Error>;
