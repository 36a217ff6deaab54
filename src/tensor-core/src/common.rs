// Copyright 2026 The Simlin Authors. All rights reserved.
// Use of this source code is governed by the Apache License,
// Version 2.0, that can be found in the LICENSE file.

use std::fmt;
use std::{error, result};

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    NoError, // will never be produced
    Generic,
    // binary format
    TruncatedStream,
    BadFormatTag,
    BadCellType,
    BadDimension,
    BadLabel,
    TrailingBytes,
    // compilation and evaluation
    ErrorType,
    BadParamCount,
    ParamTypeMismatch,
    LambdaResultType,
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        use ErrorCode::*;
        let name = match self {
            NoError => "no_error",
            Generic => "generic",
            TruncatedStream => "truncated_stream",
            BadFormatTag => "bad_format_tag",
            BadCellType => "bad_cell_type",
            BadDimension => "bad_dimension",
            BadLabel => "bad_label",
            TrailingBytes => "trailing_bytes",
            ErrorType => "error_type",
            BadParamCount => "bad_param_count",
            ParamTypeMismatch => "param_type_mismatch",
            LambdaResultType => "lambda_result_type",
        };

        write!(f, "{name}")
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ErrorKind {
    Type,
    Decode,
    Eval,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Error {
    pub kind: ErrorKind,
    pub code: ErrorCode,
    pub details: Option<String>,
}

impl Error {
    pub fn new(kind: ErrorKind, code: ErrorCode, details: Option<String>) -> Self {
        Error {
            kind,
            code,
            details,
        }
    }

    pub fn get_details(&self) -> Option<String> {
        self.details.clone()
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let kind = match self.kind {
            ErrorKind::Type => "TypeError",
            ErrorKind::Decode => "DecodeError",
            ErrorKind::Eval => "EvalError",
        };
        match self.details {
            Some(ref details) => write!(f, "{}{{{}: {}}}", kind, self.code, details),
            None => write!(f, "{}{{{}}}", kind, self.code),
        }
    }
}

impl error::Error for Error {}

pub type Result<T> = result::Result<T, Error>;

#[macro_export]
macro_rules! decode_err {
    ($code:tt, $str:expr) => {{
        use $crate::common::{Error, ErrorCode, ErrorKind};
        Err(Error::new(ErrorKind::Decode, ErrorCode::$code, Some($str)))
    }};
    ($code:tt) => {{
        use $crate::common::{Error, ErrorCode, ErrorKind};
        Err(Error::new(ErrorKind::Decode, ErrorCode::$code, None))
    }};
}

#[macro_export]
macro_rules! type_err {
    ($code:tt, $str:expr) => {{
        use $crate::common::{Error, ErrorCode, ErrorKind};
        Err(Error::new(ErrorKind::Type, ErrorCode::$code, Some($str)))
    }};
    ($code:tt) => {{
        use $crate::common::{Error, ErrorCode, ErrorKind};
        Err(Error::new(ErrorKind::Type, ErrorCode::$code, None))
    }};
}

#[macro_export]
macro_rules! eval_err {
    ($code:tt, $str:expr) => {{
        use $crate::common::{Error, ErrorCode, ErrorKind};
        Err(Error::new(ErrorKind::Eval, ErrorCode::$code, Some($str)))
    }};
    ($code:tt) => {{
        use $crate::common::{Error, ErrorCode, ErrorKind};
        Err(Error::new(ErrorKind::Eval, ErrorCode::$code, None))
    }};
}

#[test]
fn test_error_display() {
    let err = Error::new(
        ErrorKind::Decode,
        ErrorCode::TruncatedStream,
        Some("wanted 4 bytes, 2 left".to_string()),
    );
    assert_eq!(
        "DecodeError{truncated_stream: wanted 4 bytes, 2 left}",
        format!("{err}")
    );

    let err = Error::new(ErrorKind::Type, ErrorCode::ErrorType, None);
    assert_eq!("TypeError{error_type}", format!("{err}"));
}

#[test]
fn test_error_macros() {
    fn truncated() -> Result<()> {
        decode_err!(TruncatedStream, "eof".to_string())
    }
    fn bad_params() -> Result<()> {
        eval_err!(BadParamCount)
    }

    let err = truncated().unwrap_err();
    assert_eq!(ErrorKind::Decode, err.kind);
    assert_eq!(ErrorCode::TruncatedStream, err.code);
    assert_eq!(Some("eof".to_string()), err.get_details());

    let err = bad_params().unwrap_err();
    assert_eq!(ErrorKind::Eval, err.kind);
    assert_eq!(None, err.details);
}
