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

use std::fmt;

use chrono::{Datelike, Local, Timelike};
use zerocopy::{
    little_endian::U16,
    FromBytes, Immutable, IntoBytes, KnownLayout,
};

/// A date stamp packed into six bytes, as stored in a file header.
///
/// Word layout: seconds, minutes and month in the first word
/// (`sec:6 | min:6 | month:4`), hour and day in the second
/// (`hour:6 | day:5`), the full year in the third.
#[repr(C)]
#[derive(Clone, Copy, PartialEq, Eq, FromBytes, IntoBytes, Immutable, KnownLayout)]
pub struct DateTime {
    time: U16,
    date: U16,
    year: U16,
}

impl DateTime {
    pub fn new(year: u16, month: u8, day: u8, hour: u8, min: u8, sec: u8) -> Self {
        Self {
            time: U16::new(
                (sec as u16 & 0x3F) | ((min as u16 & 0x3F) << 6) | ((month as u16 & 0x0F) << 12),
            ),
            date: U16::new((hour as u16 & 0x3F) | ((day as u16 & 0x1F) << 6)),
            year: U16::new(year),
        }
    }

    pub fn year(&self) -> u16 {
        self.year.get()
    }

    pub fn month(&self) -> u8 {
        (self.time.get() >> 12) as u8
    }

    pub fn day(&self) -> u8 {
        ((self.date.get() >> 6) & 0x1F) as u8
    }

    pub fn hour(&self) -> u8 {
        (self.date.get() & 0x3F) as u8
    }

    pub fn min(&self) -> u8 {
        ((self.time.get() >> 6) & 0x3F) as u8
    }

    pub fn sec(&self) -> u8 {
        (self.time.get() & 0x3F) as u8
    }
}

impl fmt::Debug for DateTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:04}-{:02}-{:02} {:02}:{:02}:{:02}",
            self.year(),
            self.month(),
            self.day(),
            self.hour(),
            self.min(),
            self.sec()
        )
    }
}

/// Where date stamps come from. The file system consults the clock in
/// exactly two places, file creation and file write, so tests swap in a
/// fixed clock and assert on the stored words.
pub trait Clock {
    fn now(&self) -> DateTime;
}

/// The local wall clock.
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime {
        let now = Local::now();
        DateTime::new(
            now.year() as u16,
            now.month() as u8,
            now.day() as u8,
            now.hour() as u8,
            now.minute() as u8,
            now.second() as u8,
        )
    }
}
