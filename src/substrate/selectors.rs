//! Four-character-code constants for the property namespace.
//!
//! Scopes qualify a selector by direction; elements address channels, with
//! element zero reserved for the master/aggregate control.

use super::{Scope, Selector};

/// Packs a four-byte tag into a selector code.
pub const fn fourcc(tag: &[u8; 4]) -> u32 {
    u32::from_be_bytes(*tag)
}

/// Renders a code back to its tag for diagnostics.
pub fn fourcc_to_string(code: u32) -> String {
    let bytes = code.to_be_bytes();
    if bytes.iter().all(|b| b.is_ascii_graphic() || *b == b' ') {
        String::from_utf8_lossy(&bytes).into_owned()
    } else {
        format!("0x{code:08x}")
    }
}

// Scopes.
pub const SCOPE_GLOBAL: Scope = fourcc(b"glob");
pub const SCOPE_INPUT: Scope = fourcc(b"inpt");
pub const SCOPE_OUTPUT: Scope = fourcc(b"outp");
pub const SCOPE_WILDCARD: Scope = fourcc(b"****");

// System-object selectors.
pub const DEVICE_LIST: Selector = fourcc(b"dev#");
pub const DEFAULT_INPUT_DEVICE: Selector = fourcc(b"dIn ");
pub const DEFAULT_OUTPUT_DEVICE: Selector = fourcc(b"dOut");
pub const DEFAULT_SYSTEM_OUTPUT_DEVICE: Selector = fourcc(b"sOut");
/// Translation: persistent UID in, session handle out.
pub const DEVICE_FOR_UID: Selector = fourcc(b"uidd");

// Object-level selectors.
pub const NAME: Selector = fourcc(b"lnam");
pub const MANUFACTURER: Selector = fourcc(b"lmak");
pub const ELEMENT_NAME: Selector = fourcc(b"lchn");

// Device selectors.
pub const DEVICE_UID: Selector = fourcc(b"uid ");
pub const MODEL_UID: Selector = fourcc(b"muid");
pub const TRANSPORT_TYPE: Selector = fourcc(b"tran");
pub const IS_HIDDEN: Selector = fourcc(b"hidn");
pub const DEVICE_IS_ALIVE: Selector = fourcc(b"livn");
pub const DEVICE_IS_RUNNING: Selector = fourcc(b"goin");
pub const DEVICE_IS_RUNNING_SOMEWHERE: Selector = fourcc(b"gone");
pub const RELATED_DEVICES: Selector = fourcc(b"akin");

// Stream layout.
pub const CHANNEL_LAYOUT: Selector = fourcc(b"slay");
pub const PREFERRED_CHANNELS_FOR_STEREO: Selector = fourcc(b"dch2");
pub const LATENCY: Selector = fourcc(b"ltnc");
pub const SAFETY_OFFSET: Selector = fourcc(b"saft");

// Sample rate.
pub const NOMINAL_SAMPLE_RATE: Selector = fourcc(b"nsrt");
pub const ACTUAL_SAMPLE_RATE: Selector = fourcc(b"asrt");
pub const AVAILABLE_NOMINAL_SAMPLE_RATES: Selector = fourcc(b"nsr#");

// Volume and mute.
pub const VOLUME_SCALAR: Selector = fourcc(b"volm");
pub const VOLUME_DECIBELS: Selector = fourcc(b"vold");
/// Translation: scalar volume in, decibels out, per the device's own curve.
pub const VOLUME_SCALAR_TO_DECIBELS: Selector = fourcc(b"vs2d");
/// Translation: decibels in, scalar volume out.
pub const VOLUME_DECIBELS_TO_SCALAR: Selector = fourcc(b"vd2s");
pub const MUTE: Selector = fourcc(b"mute");
pub const PLAY_THRU: Selector = fourcc(b"thru");

// Clock sources.
pub const CLOCK_SOURCE: Selector = fourcc(b"csrc");
pub const CLOCK_SOURCES: Selector = fourcc(b"csc#");
/// Translation: clock source id in, human-readable name out.
pub const CLOCK_SOURCE_NAME_FOR_ID: Selector = fourcc(b"lcsn");

// Exclusive access.
pub const HOG_MODE: Selector = fourcc(b"oink");
