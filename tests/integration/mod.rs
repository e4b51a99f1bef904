//! Integration tests for the treedb resource graph engine

mod authz_roles;
mod cli_contracts;
mod link_invariants;
mod node_store;
mod snapshots;
mod support;
mod traversal;
