//! Store backends

pub mod memory;
