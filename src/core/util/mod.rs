pub mod interval_util;
