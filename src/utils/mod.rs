pub mod param_naming;
