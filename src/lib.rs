//! Registration Billing - Invoice and payment reconciliation for event registrations
//!
//! This crate turns a registration into an invoice with monthly installments
//! and admission tickets, records manual and gateway payments against those
//! installments, and keeps invoice and ticket state consistent as payments
//! settle, fail or get reversed.

pub mod adapters;
pub mod application;
pub mod config;
pub mod domain;
pub mod ports;
