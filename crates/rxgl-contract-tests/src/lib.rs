#![forbid(unsafe_code)]

//! End-to-end contracts across the reactive, runtime and scene crates, run
//! against the recording backend.

#[cfg(test)]
mod support;

#[cfg(test)]
mod uniforms;

#[cfg(test)]
mod attributes;

#[cfg(test)]
mod textures;

#[cfg(test)]
mod scheduling;

#[cfg(test)]
mod scene;

#[cfg(test)]
mod determinism;

#[cfg(test)]
mod config;
