mod cli_tests;
mod many_seeds_tests;
mod root_tests;
