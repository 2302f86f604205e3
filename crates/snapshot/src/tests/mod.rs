mod format_tests;
mod helpers;
mod remote_tests;
