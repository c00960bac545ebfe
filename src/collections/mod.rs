//! Generic containers shared by the conversation logs and translation sets.

pub mod ordered_keyed_list;

pub use ordered_keyed_list::OrderedKeyedList;
