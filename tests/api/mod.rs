mod admin_tests;
mod health_tests;
mod queue_ws_tests;
