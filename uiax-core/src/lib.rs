//! `uiax_core` -- Cross-platform UI element discovery over native
//! accessibility APIs.
//!
//! This crate contains all element, selector and tree logic with **no PyO3
//! dependency**.  It can be consumed by:
//! - `uiax-py` (PyO3 Python extension)
//! - `uiax-ffi` (C ABI library for ctypes / other languages)
//! - `uiax-cli` (standalone CLI tools)
//!
//! # Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`errors`] | `UiaxError` enum via `thiserror` |
//! | [`geometry`] | Screen-space `Point` / `Rect` |
//! | [`role`] | Normalized `Role` taxonomy and platform role mappers |
//! | [`element`] | `Element` tree node with lazily loaded children |
//! | [`selector`] | `Selector` predicate algebra and its serde form |
//! | [`tree`] | Depth-first walk, find / count / path / `print_tree`, snapshots |
//! | [`finder`] | `Finder` facade: applications, focus, queries, `wait_for` |
//! | [`platform`] | `Adapter` contract, registry, macOS AX and Windows UIA backends |
//! | [`config`] | `FinderConfig` tunables |
//! | [`cancel`] | `CancelToken` for long walks and polls |
//! | [`process`] | Process names via `sysinfo` |
//! | [`testing`] | In-memory `MockAdapter` |

pub mod cancel;
pub mod config;
pub mod element;
pub mod errors;
pub mod finder;
pub mod geometry;
pub mod platform;
pub mod process;
pub mod role;
pub mod selector;
pub mod testing;
pub mod tree;

pub use cancel::CancelToken;
pub use config::FinderConfig;
pub use element::{Element, ElementBuilder, ElementId};
pub use errors::{ErrorKind, UiaxError};
pub use finder::Finder;
pub use geometry::{Point, Rect};
pub use role::Role;
pub use selector::{Selector, SelectorSpec};
