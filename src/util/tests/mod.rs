//! util 单元测试
