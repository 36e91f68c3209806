// Copyright 2025 Lablup Inc. and Jeongkyu Shin
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Remote path and URL helpers.
//!
//! Remote paths are always posix: `/`-separated and absolute.

use url::Url;

/// Resolve a logical `name` to an absolute remote path under `root`.
///
/// `.` and empty components are dropped and `..` is resolved lexically, so a
/// name can never point above `root`. A leading `/` on the name is treated as
/// relative to `root`.
pub fn resolve(root: &str, name: &str) -> String {
    let mut components: Vec<&str> = Vec::new();
    for component in name.split('/') {
        match component {
            "" | "." => {}
            ".." => {
                components.pop();
            }
            other => components.push(other),
        }
    }

    let root = root.trim_end_matches('/');
    if components.is_empty() {
        return if root.is_empty() {
            "/".to_string()
        } else {
            root.to_string()
        };
    }
    format!("{}/{}", root, components.join("/"))
}

/// Directory containing `path`, or `None` for `/`.
pub fn parent(path: &str) -> Option<&str> {
    let trimmed = path.trim_end_matches('/');
    if trimmed.is_empty() {
        return None;
    }
    match trimmed.rsplit_once('/') {
        Some(("", _)) => Some("/"),
        Some((dir, _)) => Some(dir),
        None => None,
    }
}

/// Ancestors of an absolute `path` from the nearest upwards, excluding `/`.
///
/// `ancestors("/a/b/c")` yields `/a/b/c`, `/a/b`, `/a`.
pub fn ancestors(path: &str) -> impl Iterator<Item = &str> {
    std::iter::successors(Some(path.trim_end_matches('/')), |&p| {
        parent(p).filter(|dir| *dir != "/")
    })
    .filter(|p| !p.is_empty())
}

/// Join `name` onto `base_url` and normalise separators to `/`.
///
/// An absolute base is joined with URL reference resolution; a site-relative
/// base such as `/media/` keeps everything up to its last `/`.
pub fn url_join(base_url: &str, name: &str) -> String {
    let name = name.replace('\\', "/");
    let joined = match Url::parse(base_url).and_then(|base| base.join(&name)) {
        Ok(url) => url.to_string(),
        Err(_) => relative_join(base_url, &name),
    };
    joined.replace('\\', "/")
}

fn relative_join(base: &str, name: &str) -> String {
    if name.starts_with('/') || base.is_empty() {
        return name.to_string();
    }
    match base.rfind('/') {
        Some(idx) => format!("{}{}", &base[..=idx], name),
        None => name.to_string(),
    }
}
