//! Interpreter tests
//!
//! Organized by statement kind, plus whole-run and composition behaviour

mod helpers;

mod sequence_tests;
