mod flaky_store;
mod lifecycle;
mod persistence;
