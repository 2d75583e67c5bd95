// 该文件是 Chestpa （胸片体位） 项目的一部分。
// src/utils.rs - URL 参数辅助函数
//
// 本文件根据 Apache 许可证第 2.0 版（以下简称“许可证”）授权使用；
// 除非遵守该许可证条款，否则您不得使用本文件。
// 您可通过以下网址获取许可证副本：
// http://www.apache.org/licenses/LICENSE-2.0
// 除非适用法律要求或书面同意，根据本许可协议分发的软件均按“原样”提供，
// 不附带任何形式的明示或暗示的保证或条件。
// 有关许可权限与限制的具体条款，请参阅本许可协议。
//
// Copyright (C) 2026 Johann Li <me@qinka.pro>, Wareless Group

use std::{collections::HashMap, str::FromStr};

use url::Url;

pub fn query_map(url: &Url) -> HashMap<String, String> {
  url
    .query_pairs()
    .map(|(k, v)| (String::from(k), String::from(v)))
    .collect()
}

/// `?mirror`、`?mirror=true` 为真，`?mirror=false`、`?mirror=0` 为假
pub fn query_flag(url: &Url, key: &str) -> bool {
  query_flag_or(url, key, false)
}

/// 未给出该键时返回 `default`
pub fn query_flag_or(url: &Url, key: &str, default: bool) -> bool {
  url
    .query_pairs()
    .find(|(k, _)| k == key)
    .map(|(_, v)| !matches!(v.as_ref(), "false" | "0" | "no"))
    .unwrap_or(default)
}

pub fn query_parse<T: FromStr>(query: &HashMap<String, String>, key: &str, default: T) -> T {
  query
    .get(key)
    .and_then(|v| v.parse::<T>().ok())
    .unwrap_or(default)
}
