mod bplus_tree;

pub use bplus_tree::BPlusTree;
