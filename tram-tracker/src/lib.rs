//! Tram tracker.
//!
//! Answers: "I'm on a tram somewhere in Gothenburg, which one is it?"
//! Given a live position, finds the stop being approached on each nearby
//! line, fetches the trams due there and ranks them by how well their
//! timetable explains the rider being where they are right now.

pub mod cache;
pub mod config;
pub mod domain;
pub mod geometry;
pub mod identify;
pub mod nearby;
pub mod task;
pub mod tracker;
pub mod vasttrafik;
