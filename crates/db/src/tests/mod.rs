mod facade_tests;
mod helpers;
