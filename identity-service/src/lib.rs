//! Identity Service - Multi-tenant identity data store.
//!
//! Clients own organizations and applications; applications enroll users
//! through an explicit membership table, with per-application roles and
//! credentials. This crate is the persistence layer only: request
//! handling, token issuance, and session management live in the services
//! that embed it.

pub mod config;
pub mod db;
pub mod models;
pub mod services;
pub mod utils;
