/*
 * Copyright 2024 Luc Lenôtre
 *
 * This file is part of Maestro.
 *
 * Maestro is free software: you can redistribute it and/or modify it under the
 * terms of the GNU General Public License as published by the Free Software
 * Foundation, either version 3 of the License, or (at your option) any later
 * version.
 *
 * Maestro is distributed in the hope that it will be useful, but WITHOUT ANY
 * WARRANTY; without even the implied warranty of MERCHANTABILITY or FITNESS FOR
 * A PARTICULAR PURPOSE. See the GNU General Public License for more details.
 *
 * You should have received a copy of the GNU General Public License along with
 * Maestro. If not, see <https://www.gnu.org/licenses/>.
 */

//! This module implements kernel panics handling.
//!
//! A kernel panic occurs when an error is raised that the kernel cannot recover
//! from. There is no real hardware to reboot in this simulated architecture, so a panic just
//! logs the reason and parks the calling thread forever.

use crate::{logger::LOGGER, println};
use core::{fmt, panic::PanicInfo};

fn panic_impl(msg: impl fmt::Display, loc: Option<&core::panic::Location>) -> ! {
	LOGGER.lock().silent = false;
	println!("-- KERNEL PANIC! --");
	if let Some(loc) = loc {
		println!("Reason: {msg} Location: {loc}");
	} else {
		println!("Reason: {msg}");
	}
	println!("-- end trace --");
	loop {
		core::hint::spin_loop();
	}
}

/// Called on Rust panic.
#[panic_handler]
fn panic(panic_info: &PanicInfo) -> ! {
	panic_impl(panic_info.message(), panic_info.location());
}

#[lang = "eh_personality"]
fn eh_personality() {}
