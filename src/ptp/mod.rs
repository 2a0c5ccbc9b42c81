//! PTPv2 client and tracking filter chain: subnanosecond
//! timestamp arithmetic, the tunable-oscillator contract, chainable
//! tracking filters, and the event/general message pipeline that ties
//! them to a measurement.

pub mod client;
pub mod filters;
pub mod oscillator;
pub mod timestamp;

pub use client::{Measurement, Outbound, PtpClient, PtpHeader, PtpMode, HEADER_LEN};
pub use filters::{
    AmplitudeReject, BoxcarFilter, ControllerLR, ControllerPI, ControllerPII, Filter, MedianFilter,
    TrackingController,
};
pub use oscillator::{Dither, RecordingOscillator, TunableOscillator};
pub use timestamp::{Time, SUBNS_PER_NS};
