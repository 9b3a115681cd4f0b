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

//! Virtual memory: address spaces, memory objects, the page-frame cache, and page-fault
//! handling.
//!
//! Layering, bottom to top: [`pframe`] caches page contents; [`mmobj`] decides where a missing
//! page's content comes from (zero, disk, or an ancestor object); [`vmmap`] is the ordered set of
//! mappings a process's address space consists of; [`fault`] ties the three together behind the
//! single entry point an architecture's trap handler calls into.

pub mod fault;
pub mod mmobj;
pub mod pframe;
pub mod vmmap;
