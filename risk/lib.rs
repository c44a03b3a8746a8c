#![deny(unused_variables)]
#![deny(dead_code)]
#![deny(unused_imports)]
pub mod alpha;
pub mod artifact;
pub mod calibration;
pub mod constants;
pub mod data;
pub mod engine;
pub mod hazard;
pub mod incidence;
pub mod patient;
