// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use core::fmt;

use serde::{Deserialize, Serialize};

use crate::params::DataCode;

/// Boolean enumeration with permissive string parsing.
#[derive(Deserialize, Serialize, Debug, Clone, Copy, PartialEq, Eq)]
pub enum YesNo {
    #[serde(
        rename = "Yes",
        alias = "yes",
        alias = "YES",
        alias = "true",
        alias = "True",
        alias = "1"
    )]
    Yes,
    #[serde(
        rename = "No",
        alias = "no",
        alias = "NO",
        alias = "false",
        alias = "False",
        alias = "0"
    )]
    No,
}

impl fmt::Display for YesNo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            YesNo::Yes => "Yes",
            YesNo::No => "No",
        })
    }
}

impl From<bool> for YesNo {
    fn from(b: bool) -> Self {
        if b { YesNo::Yes } else { YesNo::No }
    }
}

impl YesNo {
    pub fn as_bool(self) -> bool {
        matches!(self, YesNo::Yes)
    }
}

/// `PI_16` value as written in configuration files.
#[derive(Deserialize, Serialize, Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataCoding {
    #[serde(rename = "ASCII", alias = "ascii", alias = "Ascii")]
    Ascii,
    #[serde(rename = "EBCDIC", alias = "ebcdic", alias = "Ebcdic")]
    Ebcdic,
    #[serde(rename = "Binary", alias = "binary", alias = "BINARY")]
    Binary,
}

impl fmt::Display for DataCoding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            DataCoding::Ascii => "ASCII",
            DataCoding::Ebcdic => "EBCDIC",
            DataCoding::Binary => "Binary",
        })
    }
}

impl From<DataCoding> for DataCode {
    fn from(c: DataCoding) -> Self {
        match c {
            DataCoding::Ascii => DataCode::Ascii,
            DataCoding::Ebcdic => DataCode::Ebcdic,
            DataCoding::Binary => DataCode::Binary,
        }
    }
}
