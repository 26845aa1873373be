mod adapter;

pub use adapter::HttpLlmAdapter;
