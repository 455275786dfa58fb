// Copyright 2024 Kevin Ludwig
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

//! Path normalization. Every operation resolves its argument to a
//! canonical absolute path before touching the image: no `.` or `..`
//! segments, no duplicate or trailing separators, `/` for the root.

use fatbox_err::{FatError, Result};

use crate::MAX_PATH_LENGTH;

/// Resolves `path` against `current_dir` (itself canonical) into a
/// canonical absolute path.
///
/// `.` segments are dropped and `..` pops the previous segment; popping
/// past the root is an error. Any other segment beginning with a dot
/// (`...`, `..a`, `.x`) is a malformed token, not a name. The result
/// never exceeds `MAX_PATH_LENGTH` bytes.
pub fn absolute(current_dir: &str, path: &str) -> Result<String> {
    if path.is_empty() {
        return Err(FatError::InvalidPath);
    }

    let mut segments = Vec::new();
    if !path.starts_with('/') {
        for segment in current_dir.split('/') {
            push_segment(&mut segments, segment)?;
        }
    }
    for segment in path.split('/') {
        push_segment(&mut segments, segment)?;
    }

    let result = if segments.is_empty() {
        String::from("/")
    } else {
        let mut result = String::new();
        for segment in segments {
            result.push('/');
            result.push_str(segment);
        }
        result
    };
    if result.len() > MAX_PATH_LENGTH {
        return Err(FatError::InvalidPath);
    }

    Ok(result)
}

fn push_segment<'a>(segments: &mut Vec<&'a str>, segment: &'a str) -> Result<()> {
    match segment {
        "" | "." => {}
        ".." => {
            if segments.pop().is_none() {
                return Err(FatError::InvalidPath);
            }
        }
        _ if segment.starts_with('.') => return Err(FatError::InvalidPath),
        _ => segments.push(segment),
    }
    Ok(())
}

/// Resolves `path` and splits it into the directory that holds the named
/// element and the element's own name. The root has no name to split off.
pub fn components(current_dir: &str, path: &str) -> Result<(String, String)> {
    let absolute = absolute(current_dir, path)?;
    if absolute == "/" {
        return Err(FatError::InvalidPath);
    }

    let split = absolute.rfind('/').ok_or(FatError::InvalidPath)?;
    let leaf = absolute[split + 1..].to_string();
    let dir = if split == 0 {
        String::from("/")
    } else {
        absolute[..split].to_string()
    };
    Ok((dir, leaf))
}
