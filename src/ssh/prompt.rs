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

use zeroize::Zeroizing;

/// Source of a password when interactive authentication is enabled.
///
/// Implementations may block; the session manager calls them off the async
/// runtime.
pub trait PasswordPrompt: Send + Sync {
    fn prompt_password(&self, username: &str, host: &str) -> std::io::Result<Zeroizing<String>>;
}

/// Reads the password from the controlling terminal without echo.
#[derive(Debug, Default, Clone, Copy)]
pub struct TerminalPrompt;

impl PasswordPrompt for TerminalPrompt {
    fn prompt_password(&self, username: &str, host: &str) -> std::io::Result<Zeroizing<String>> {
        // Use Zeroizing to ensure password is cleared from memory when dropped
        rpassword::prompt_password(format!("Enter password for {username}@{host}: "))
            .map(Zeroizing::new)
    }
}
