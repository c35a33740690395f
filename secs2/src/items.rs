// Copyright © 2024 Nathaniel Hardesty
//
// Permission is hereby granted, free of charge, to any person obtaining a copy
// of this software and associated documentation files (the “Software”), to
// deal in the Software without restriction, including without limitation the
// rights to use, copy, modify, merge, publish, distribute, sublicense, and/or
// sell copies of the Software, and to permit persons to whom the Software is
// furnished to do so, subject to the following conditions:
//
// The above copyright notice and this permission notice shall be included in
// all copies or substantial portions of the Software.
//
// THE SOFTWARE IS PROVIDED “AS IS”, WITHOUT WARRANTY OF ANY KIND, EXPRESS OR
// IMPLIED, INCLUDING BUT NOT LIMITED TO THE WARRANTIES OF MERCHANTABILITY,
// FITNESS FOR A PARTICULAR PURPOSE AND NONINFRINGEMENT. IN NO EVENT SHALL THE
// AUTHORS OR COPYRIGHT HOLDERS BE LIABLE FOR ANY CLAIM, DAMAGES OR OTHER
// LIABILITY, WHETHER IN AN ACTION OF CONTRACT, TORT OR OTHERWISE, ARISING
// FROM, OUT OF OR IN CONNECTION WITH THE SOFTWARE OR THE USE OR OTHER DEALINGS
// IN THE SOFTWARE.

//! # ITEMS
//! **Based on SEMI E5§9.6, Table 3 - Data Item Dictionary**
//!
//! ---------------------------------------------------------------------------
//!
//! The data item catalogue used by the GEM message subset. Every entry is an
//! immutable [Data Item Schema] record: a name, the accepted formats, and an
//! optional size bound. The [Function Registry] composes these records into
//! message body shapes.
//!
//! [Data Item Schema]: crate::schema::DataItemSchema
//! [Function Registry]: crate::registry::FunctionRegistry

use crate::schema::{DataItemSchema, ItemKind, ANY_INTEGER};

/// ## DATA ITEM MACRO
///
/// #### Arguments:
///
/// - **$ident**: Name of the constant.
/// - **$kinds**: Accepted format list.
/// - **$max_len**: Optional maximum member count.
macro_rules! data_item {
  ($(#[$doc:meta])* $ident:ident, $kinds:expr, $max_len:expr) => {
    $(#[$doc])*
    pub static $ident: DataItemSchema =
      DataItemSchema::new(stringify!($ident), $kinds, $max_len);
  };
}

data_item! {
  /// ### COMMACK
  ///
  /// Establish communications acknowledge code. 0 accepted, 1 denied.
  ///
  /// Used in S1F14.
  COMMACK, &[ItemKind::Bin], Some(1)
}

data_item! {
  /// ### OFLACK
  ///
  /// Acknowledge code for OFF-LINE request. 0 accepted.
  ///
  /// Used in S1F16.
  OFLACK, &[ItemKind::Bin], Some(1)
}

data_item! {
  /// ### ONLACK
  ///
  /// Acknowledge code for ON-LINE request. 0 accepted, 1 not allowed,
  /// 2 already on-line.
  ///
  /// Used in S1F18.
  ONLACK, &[ItemKind::Bin], Some(1)
}

data_item! {
  /// ### MDLN
  ///
  /// Equipment model type, 20 bytes max.
  ///
  /// Used in S1F2, S1F13, S1F14.
  MDLN, &[ItemKind::Ascii], Some(20)
}

data_item! {
  /// ### SOFTREV
  ///
  /// Software revision code, 20 bytes max.
  ///
  /// Used in S1F2, S1F13, S1F14.
  SOFTREV, &[ItemKind::Ascii], Some(20)
}

data_item! {
  /// ### SVID
  ///
  /// Status variable ID.
  ///
  /// Used in S1F3, S1F11, S1F12.
  SVID, ANY_INTEGER, None
}

data_item! {
  /// ### SV
  ///
  /// Status variable value. Any format the equipment defines.
  ///
  /// Used in S1F4.
  SV, &[
    ItemKind::List, ItemKind::Ascii, ItemKind::Jis8, ItemKind::Bin,
    ItemKind::Bool, ItemKind::I1, ItemKind::I2, ItemKind::I4, ItemKind::I8,
    ItemKind::U1, ItemKind::U2, ItemKind::U4, ItemKind::U8,
    ItemKind::F4, ItemKind::F8,
  ], None
}

data_item! {
  /// ### SVNAME
  ///
  /// Status variable name.
  ///
  /// Used in S1F12.
  SVNAME, &[ItemKind::Ascii], None
}

data_item! {
  /// ### UNITS
  ///
  /// Units identifier.
  ///
  /// Used in S1F12, S2F30.
  UNITS, &[ItemKind::Ascii], None
}

data_item! {
  /// ### ECID
  ///
  /// Equipment constant ID.
  ///
  /// Used in S2F13, S2F15, S2F29, S2F30.
  ECID, ANY_INTEGER, None
}

data_item! {
  /// ### ECV
  ///
  /// Equipment constant value.
  ///
  /// Used in S2F14, S2F15.
  ECV, &[
    ItemKind::Ascii, ItemKind::Jis8, ItemKind::Bin, ItemKind::Bool,
    ItemKind::I1, ItemKind::I2, ItemKind::I4, ItemKind::I8,
    ItemKind::U1, ItemKind::U2, ItemKind::U4, ItemKind::U8,
    ItemKind::F4, ItemKind::F8,
  ], None
}

data_item! {
  /// ### ECNAME
  ///
  /// Equipment constant name.
  ///
  /// Used in S2F30.
  ECNAME, &[ItemKind::Ascii], None
}

/// ### EQUIPMENT CONSTANT LIMIT FORMATS
///
/// The format set shared by the ECMIN, ECMAX, and ECDEF limit items.
const EC_LIMIT_KINDS: &[ItemKind] = &[
  ItemKind::Ascii, ItemKind::Bin, ItemKind::Bool,
  ItemKind::I1, ItemKind::I2, ItemKind::I4, ItemKind::I8,
  ItemKind::U1, ItemKind::U2, ItemKind::U4, ItemKind::U8,
  ItemKind::F4, ItemKind::F8,
];

data_item! {
  /// ### ECMIN
  ///
  /// Equipment constant minimum value.
  ///
  /// Used in S2F30.
  ECMIN, EC_LIMIT_KINDS, None
}

data_item! {
  /// ### ECMAX
  ///
  /// Equipment constant maximum value.
  ///
  /// Used in S2F30.
  ECMAX, EC_LIMIT_KINDS, None
}

data_item! {
  /// ### ECDEF
  ///
  /// Equipment constant default value.
  ///
  /// Used in S2F30.
  ECDEF, EC_LIMIT_KINDS, None
}

data_item! {
  /// ### EAC
  ///
  /// Equipment acknowledge code. 0 accepted, 1 denied (at least one constant
  /// does not exist), 3 denied (at least one value out of range).
  ///
  /// Used in S2F16.
  EAC, &[ItemKind::Bin], Some(1)
}

data_item! {
  /// ### TIME
  ///
  /// Time of day, 16-byte "YYYYMMDDhhmmsscc" form.
  ///
  /// Used in S2F18, S2F31.
  TIME, &[ItemKind::Ascii], Some(32)
}

data_item! {
  /// ### TIACK
  ///
  /// Time acknowledge code. 0 accepted.
  ///
  /// Used in S2F32.
  TIACK, &[ItemKind::Bin], Some(1)
}

data_item! {
  /// ### DATAID
  ///
  /// Data ID correlating multi-message transactions.
  ///
  /// Used in S2F33, S2F35, S6F11.
  DATAID, ANY_INTEGER, None
}

data_item! {
  /// ### RPTID
  ///
  /// Report ID.
  ///
  /// Used in S2F33, S2F35, S6F11.
  RPTID, ANY_INTEGER, None
}

data_item! {
  /// ### VID
  ///
  /// Variable ID.
  ///
  /// Used in S2F33.
  VID, ANY_INTEGER, None
}

data_item! {
  /// ### CEID
  ///
  /// Collection event ID.
  ///
  /// Used in S2F35, S2F37, S6F11, S6F15.
  CEID, ANY_INTEGER, None
}

data_item! {
  /// ### CEED
  ///
  /// Collection event enable/disable code. True enables.
  ///
  /// Used in S2F37.
  CEED, &[ItemKind::Bool], Some(1)
}

data_item! {
  /// ### DRACK
  ///
  /// Define report acknowledge code. 0 accepted.
  ///
  /// Used in S2F34.
  DRACK, &[ItemKind::Bin], Some(1)
}

data_item! {
  /// ### LRACK
  ///
  /// Link report acknowledge code. 0 accepted.
  ///
  /// Used in S2F36.
  LRACK, &[ItemKind::Bin], Some(1)
}

data_item! {
  /// ### ERACK
  ///
  /// Enable/disable event report acknowledge code. 0 accepted.
  ///
  /// Used in S2F38.
  ERACK, &[ItemKind::Bin], Some(1)
}

data_item! {
  /// ### RCMD
  ///
  /// Remote command.
  ///
  /// Used in S2F41.
  RCMD, &[ItemKind::Ascii, ItemKind::I1, ItemKind::U1], None
}

data_item! {
  /// ### HCACK
  ///
  /// Host command acknowledge code. 0 accepted.
  ///
  /// Used in S2F42.
  HCACK, &[ItemKind::Bin], Some(1)
}

data_item! {
  /// ### CPNAME
  ///
  /// Command parameter name.
  ///
  /// Used in S2F41, S2F42.
  CPNAME, &[ItemKind::Ascii, ItemKind::I1, ItemKind::I2, ItemKind::I4,
            ItemKind::I8, ItemKind::U1, ItemKind::U2, ItemKind::U4,
            ItemKind::U8], None
}

data_item! {
  /// ### CPVAL
  ///
  /// Command parameter value.
  ///
  /// Used in S2F41.
  CPVAL, &[ItemKind::Ascii, ItemKind::Jis8, ItemKind::Bin, ItemKind::Bool,
           ItemKind::I1, ItemKind::I2, ItemKind::I4, ItemKind::I8,
           ItemKind::U1, ItemKind::U2, ItemKind::U4, ItemKind::U8], None
}

data_item! {
  /// ### CPACK
  ///
  /// Command parameter acknowledge code.
  ///
  /// Used in S2F42.
  CPACK, &[ItemKind::Bin], Some(1)
}

data_item! {
  /// ### ALCD
  ///
  /// Alarm code byte. Bit 8 signals the alarm set state.
  ///
  /// Used in S5F1, S5F6.
  ALCD, &[ItemKind::Bin], Some(1)
}

data_item! {
  /// ### ALID
  ///
  /// Alarm ID.
  ///
  /// Used in S5F1, S5F3, S5F5, S5F6.
  ALID, ANY_INTEGER, None
}

data_item! {
  /// ### ALTX
  ///
  /// Alarm text, 120 bytes max.
  ///
  /// Used in S5F1, S5F6.
  ALTX, &[ItemKind::Ascii], Some(120)
}

data_item! {
  /// ### ALED
  ///
  /// Alarm enable/disable code. Bit 8 enables.
  ///
  /// Used in S5F3.
  ALED, &[ItemKind::Bin], Some(1)
}

data_item! {
  /// ### ACKC5
  ///
  /// Stream 5 acknowledge code. 0 accepted.
  ///
  /// Used in S5F2, S5F4.
  ACKC5, &[ItemKind::Bin], Some(1)
}

data_item! {
  /// ### ACKC6
  ///
  /// Stream 6 acknowledge code. 0 accepted.
  ///
  /// Used in S6F12.
  ACKC6, &[ItemKind::Bin], Some(1)
}

data_item! {
  /// ### ACKC10
  ///
  /// Stream 10 acknowledge code. 0 accepted, 1 will not be displayed,
  /// 2 terminal not available.
  ///
  /// Used in S10F2, S10F4.
  ACKC10, &[ItemKind::Bin], Some(1)
}

data_item! {
  /// ### TID
  ///
  /// Terminal ID.
  ///
  /// Used in S10F1, S10F3.
  TID, &[ItemKind::Bin], Some(1)
}

data_item! {
  /// ### TEXT
  ///
  /// Terminal text line.
  ///
  /// Used in S10F1, S10F3.
  TEXT, &[ItemKind::Ascii, ItemKind::Jis8, ItemKind::Bin,
          ItemKind::I1, ItemKind::I2, ItemKind::I4, ItemKind::I8,
          ItemKind::U1, ItemKind::U2, ItemKind::U4, ItemKind::U8], None
}

data_item! {
  /// ### MHEAD
  ///
  /// SECS message block header associated with the message in error, echoed
  /// back in the Stream 9 report.
  ///
  /// Used in S9F1, S9F3, S9F5, S9F7, S9F11.
  MHEAD, &[ItemKind::Bin], Some(10)
}

data_item! {
  /// ### SHEAD
  ///
  /// Stored header related to the transaction timer in error.
  ///
  /// Used in S9F9.
  SHEAD, &[ItemKind::Bin], Some(10)
}

data_item! {
  /// ### MEXP
  ///
  /// Message expected, "SxxFyy" form.
  ///
  /// Used in S9F13.
  MEXP, &[ItemKind::Ascii], Some(6)
}

data_item! {
  /// ### EDID
  ///
  /// Expected data identification.
  ///
  /// Used in S9F13.
  EDID, &[ItemKind::Ascii, ItemKind::Bin, ItemKind::I1, ItemKind::I2,
          ItemKind::I4, ItemKind::I8, ItemKind::U1, ItemKind::U2,
          ItemKind::U4, ItemKind::U8], None
}
