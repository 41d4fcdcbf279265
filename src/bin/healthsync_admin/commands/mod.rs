// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Pierre Fitness Intelligence
// ABOUTME: Re-exports command modules for healthsync-admin
// ABOUTME: Provides replay, dead-letter, and user directory commands

pub mod dead_letters;
pub mod replay;
pub mod user;
