//! Read-only FIFF access, limited to what trigger extraction needs.
//!
//! ```no_run
//! use emeg::fiff::open_raw;
//!
//! let raw = open_raw("A0023/raw/A0023_OLDT1_raw.fif").unwrap();
//! println!("{} channels @ {} Hz", raw.info.n_chan, raw.info.sfreq);
//! let stim = raw.read_channels(&raw.info.stim_picks()).unwrap();
//! ```
pub mod constants;
pub mod info;
pub mod raw;
pub mod tag;
pub mod tree;

pub use info::{ChannelInfo, MeasInfo, read_meas_info};
pub use raw::{open_raw, RawFif, BufferRecord};
pub use tag::{TagHeader, read_tag_header};
pub use tree::{Node, read_tree, load_directory};
