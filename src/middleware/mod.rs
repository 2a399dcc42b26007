pub mod check_access;
