//-
// Copyright (c) 2024, The Marginalia Authors
//
// This file is part of Marginalia.
//
// Marginalia is free software: you can redistribute it and/or modify it under
// the terms of the GNU General Public License as published by the Free
// Software Foundation, either version 3 of the License, or (at your option)
// any later version.
//
// Marginalia is distributed in the hope that it will be useful, but WITHOUT
// ANY WARRANTY; without even the implied warranty of MERCHANTABILITY or
// FITNESS FOR A PARTICULAR PURPOSE. See the GNU General Public License for
// more details.
//
// You should have received a copy of the GNU General Public License along
// with Marginalia. If not, see <http://www.gnu.org/licenses/>.

#[allow(clippy::module_inception)]
pub mod account;
pub mod annotations;
pub mod memory;
pub mod model;
