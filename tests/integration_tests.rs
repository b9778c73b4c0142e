// Integration tests entry point
// These tests start throwaway local HTTP origins and use temp directories

mod integration {
    mod fetch_test;
    mod pipeline_test;
    pub mod support;
}
