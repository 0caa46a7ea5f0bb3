//! Proxy Layer
//!
//! Reactive and readonly access to plain objects, arrays and keyed
//! collections.
//!
//! # Concepts
//!
//! ## Raw Objects and Proxies
//!
//! A [`Raw`] object is plain shared storage. Wrapping it with [`reactive`],
//! [`readonly`], [`shallow_reactive`] or [`shallow_readonly`] yields a
//! [`Proxy`] whose accessors record reads and announce writes. Each raw
//! object has at most one proxy per flavor.
//!
//! ## Accessors
//!
//! Rust has no transparent property interception, so reads and writes go
//! through explicit accessors on [`Value`]: `get` / `set` / `delete` /
//! `has` / `own_keys` for objects and arrays, `get_entry` / `insert` /
//! `add` / `remove` / `clear` / `size` and the iterators for collections.
//!
//! ## Laziness
//!
//! Nothing is wrapped eagerly. A nested object becomes reactive when it is
//! read through a proxy, which keeps wrapping cheap and makes cyclic graphs
//! safe.

mod base_handlers;
mod collection_handlers;
mod object;
mod snapshot;
mod value;
mod wrap;

pub use collection_handlers::CollectionIter;
pub use object::Raw;
pub use value::{PropKey, Symbol, Value};
pub use wrap::{
    is_reactive, is_readonly, live_proxy_count, mark_non_reactive, mark_readonly, reactive,
    readonly, shallow_reactive, shallow_readonly, to_raw, Flavor, Proxy,
};
