mod pdu_tests;
mod session_tests;
