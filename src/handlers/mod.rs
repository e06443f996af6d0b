//! HTTP handlers for resource routes and their documentation.

pub mod docs;
pub mod resource;
