mod admission_tests;
mod reconnect_tests;
