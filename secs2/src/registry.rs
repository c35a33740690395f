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

//! # FUNCTION REGISTRY
//! **Based on SEMI E5§10 and the SEMI E30 required message subset**
//!
//! ---------------------------------------------------------------------------
//!
//! The immutable table mapping each (stream, function) pair to its body
//! schema, reply expectation, and secondary function. The registry is
//! populated once at stack construction and never mutated afterwards; the
//! send and receive paths both validate bodies against it.
//!
//! A received message with an unknown (stream, function) is not an error at
//! this layer: it is delivered upwards as a raw-body message, and GEM
//! decides whether a Stream 9 report goes back.

use std::collections::HashMap;

use crate::items;
use crate::schema::BodySchema;

/// ## FUNCTION SCHEMA
///
/// One registry entry: what a particular message is named, what its body must
/// look like, and whether a reply is expected.
#[derive(Clone, Copy, Debug)]
pub struct FunctionSchema {
  /// ### STREAM
  pub stream: u8,

  /// ### FUNCTION
  pub function: u8,

  /// ### FUNCTION NAME
  ///
  /// The mnemonic the standard uses, such as "EstablishCommunicationsRequest".
  pub name: &'static str,

  /// ### REPLY EXPECTED
  ///
  /// Whether the W-bit is set when this message is sent as a primary.
  pub w: bool,

  /// ### BODY SCHEMA
  pub body: BodySchema,

  /// ### SECONDARY FUNCTION
  ///
  /// For primaries with a reply, the (stream, function) of the expected
  /// secondary.
  pub secondary: Option<(u8, u8)>,
}

/// ## FUNCTION SCHEMA MACRO
///
/// #### Arguments:
///
/// - **$ident**: Name of the static.
/// - **$name**: Mnemonic name.
/// - **$stream / $function**: Message class.
/// - **$w**: Reply expectation.
/// - **$secondary**: Expected secondary, if any.
/// - **$body**: Body schema expression.
macro_rules! function_schema {
  (
    $(#[$doc:meta])*
    $ident:ident, $name:literal, $stream:literal, $function:literal,
    $w:literal, $secondary:expr, $body:expr
  ) => {
    $(#[$doc])*
    pub static $ident: FunctionSchema = FunctionSchema {
      stream: $stream,
      function: $function,
      name: $name,
      w: $w,
      body: $body,
      secondary: $secondary,
    };
  };
}

// STREAM 1: EQUIPMENT STATUS

function_schema! {
  /// ### S1F1
  ///
  /// Are You There Request (R). Header only.
  S1F1, "AreYouThere", 1, 1, true, Some((1, 2)),
  BodySchema::Empty
}

function_schema! {
  /// ### S1F2
  ///
  /// On Line Data (D). Equipment answers {MDLN, SOFTREV}, a host answers
  /// with a zero-length list.
  S1F2, "OnLineData", 1, 2, false, None,
  BodySchema::OptionList(&[
    BodySchema::Item(&items::MDLN),
    BodySchema::Item(&items::SOFTREV),
  ])
}

function_schema! {
  /// ### S1F3
  ///
  /// Selected Equipment Status Request (SSR). A zero-length list requests
  /// all status variables.
  S1F3, "SelectedEquipmentStatusRequest", 1, 3, true, Some((1, 4)),
  BodySchema::VarList(&BodySchema::Item(&items::SVID))
}

function_schema! {
  /// ### S1F4
  ///
  /// Selected Equipment Status Data (SSD), values in requested order.
  S1F4, "SelectedEquipmentStatusData", 1, 4, false, None,
  BodySchema::VarList(&BodySchema::Item(&items::SV))
}

function_schema! {
  /// ### S1F11
  ///
  /// Status Variable Namelist Request (SVNR). A zero-length list requests
  /// all status variables.
  S1F11, "StatusVariableNamelistRequest", 1, 11, true, Some((1, 12)),
  BodySchema::VarList(&BodySchema::Item(&items::SVID))
}

function_schema! {
  /// ### S1F12
  ///
  /// Status Variable Namelist Reply (SVNRR).
  S1F12, "StatusVariableNamelistReply", 1, 12, false, None,
  BodySchema::VarList(&BodySchema::List(&[
    BodySchema::Item(&items::SVID),
    BodySchema::Item(&items::SVNAME),
    BodySchema::Item(&items::UNITS),
  ]))
}

function_schema! {
  /// ### S1F13
  ///
  /// Establish Communications Request (CR). Equipment sends {MDLN, SOFTREV},
  /// a host sends a zero-length list.
  S1F13, "EstablishCommunicationsRequest", 1, 13, true, Some((1, 14)),
  BodySchema::OptionList(&[
    BodySchema::Item(&items::MDLN),
    BodySchema::Item(&items::SOFTREV),
  ])
}

function_schema! {
  /// ### S1F14
  ///
  /// Establish Communications Request Acknowledge (CRA).
  S1F14, "EstablishCommunicationsAcknowledge", 1, 14, false, None,
  BodySchema::List(&[
    BodySchema::Item(&items::COMMACK),
    BodySchema::OptionList(&[
      BodySchema::Item(&items::MDLN),
      BodySchema::Item(&items::SOFTREV),
    ]),
  ])
}

function_schema! {
  /// ### S1F15
  ///
  /// Request OFF-LINE (ROFL). Header only.
  S1F15, "RequestOffLine", 1, 15, true, Some((1, 16)),
  BodySchema::Empty
}

function_schema! {
  /// ### S1F16
  ///
  /// OFF-LINE Acknowledge (OFLA).
  S1F16, "OffLineAcknowledge", 1, 16, false, None,
  BodySchema::Item(&items::OFLACK)
}

function_schema! {
  /// ### S1F17
  ///
  /// Request ON-LINE (RONL). Header only.
  S1F17, "RequestOnLine", 1, 17, true, Some((1, 18)),
  BodySchema::Empty
}

function_schema! {
  /// ### S1F18
  ///
  /// ON-LINE Acknowledge (ONLA).
  S1F18, "OnLineAcknowledge", 1, 18, false, None,
  BodySchema::Item(&items::ONLACK)
}

// STREAM 2: EQUIPMENT CONTROL AND DIAGNOSTICS

function_schema! {
  /// ### S2F13
  ///
  /// Equipment Constant Request (ECR). A zero-length list requests all
  /// constants.
  S2F13, "EquipmentConstantRequest", 2, 13, true, Some((2, 14)),
  BodySchema::VarList(&BodySchema::Item(&items::ECID))
}

function_schema! {
  /// ### S2F14
  ///
  /// Equipment Constant Data (ECD).
  S2F14, "EquipmentConstantData", 2, 14, false, None,
  BodySchema::VarList(&BodySchema::Item(&items::ECV))
}

function_schema! {
  /// ### S2F15
  ///
  /// New Equipment Constant Send (ECS).
  S2F15, "NewEquipmentConstantSend", 2, 15, true, Some((2, 16)),
  BodySchema::VarList(&BodySchema::List(&[
    BodySchema::Item(&items::ECID),
    BodySchema::Item(&items::ECV),
  ]))
}

function_schema! {
  /// ### S2F16
  ///
  /// New Equipment Constant Acknowledge (ECA).
  S2F16, "NewEquipmentConstantAcknowledge", 2, 16, false, None,
  BodySchema::Item(&items::EAC)
}

function_schema! {
  /// ### S2F17
  ///
  /// Date and Time Request (DTR). Header only.
  S2F17, "DateTimeRequest", 2, 17, true, Some((2, 18)),
  BodySchema::Empty
}

function_schema! {
  /// ### S2F18
  ///
  /// Date and Time Data (DTD).
  S2F18, "DateTimeData", 2, 18, false, None,
  BodySchema::Item(&items::TIME)
}

function_schema! {
  /// ### S2F29
  ///
  /// Equipment Constant Namelist Request (ECNR). A zero-length list requests
  /// all constants.
  S2F29, "EquipmentConstantNamelistRequest", 2, 29, true, Some((2, 30)),
  BodySchema::VarList(&BodySchema::Item(&items::ECID))
}

function_schema! {
  /// ### S2F30
  ///
  /// Equipment Constant Namelist (ECN).
  S2F30, "EquipmentConstantNamelist", 2, 30, false, None,
  BodySchema::VarList(&BodySchema::List(&[
    BodySchema::Item(&items::ECID),
    BodySchema::Item(&items::ECNAME),
    BodySchema::Item(&items::ECMIN),
    BodySchema::Item(&items::ECMAX),
    BodySchema::Item(&items::ECDEF),
    BodySchema::Item(&items::UNITS),
  ]))
}

function_schema! {
  /// ### S2F31
  ///
  /// Date and Time Send (DTS).
  S2F31, "DateTimeSend", 2, 31, true, Some((2, 32)),
  BodySchema::Item(&items::TIME)
}

function_schema! {
  /// ### S2F32
  ///
  /// Date and Time Acknowledge (DTA).
  S2F32, "DateTimeAcknowledge", 2, 32, false, None,
  BodySchema::Item(&items::TIACK)
}

function_schema! {
  /// ### S2F33
  ///
  /// Define Report (DR). A report list of zero length deletes all report
  /// definitions.
  S2F33, "DefineReport", 2, 33, true, Some((2, 34)),
  BodySchema::List(&[
    BodySchema::Item(&items::DATAID),
    BodySchema::VarList(&BodySchema::List(&[
      BodySchema::Item(&items::RPTID),
      BodySchema::VarList(&BodySchema::Item(&items::VID)),
    ])),
  ])
}

function_schema! {
  /// ### S2F34
  ///
  /// Define Report Acknowledge (DRA).
  S2F34, "DefineReportAcknowledge", 2, 34, false, None,
  BodySchema::Item(&items::DRACK)
}

function_schema! {
  /// ### S2F35
  ///
  /// Link Event Report (LER).
  S2F35, "LinkEventReport", 2, 35, true, Some((2, 36)),
  BodySchema::List(&[
    BodySchema::Item(&items::DATAID),
    BodySchema::VarList(&BodySchema::List(&[
      BodySchema::Item(&items::CEID),
      BodySchema::VarList(&BodySchema::Item(&items::RPTID)),
    ])),
  ])
}

function_schema! {
  /// ### S2F36
  ///
  /// Link Event Report Acknowledge (LERA).
  S2F36, "LinkEventReportAcknowledge", 2, 36, false, None,
  BodySchema::Item(&items::LRACK)
}

function_schema! {
  /// ### S2F37
  ///
  /// Enable/Disable Event Report (EDER). A zero-length CEID list addresses
  /// all events.
  S2F37, "EnableDisableEventReport", 2, 37, true, Some((2, 38)),
  BodySchema::List(&[
    BodySchema::Item(&items::CEED),
    BodySchema::VarList(&BodySchema::Item(&items::CEID)),
  ])
}

function_schema! {
  /// ### S2F38
  ///
  /// Enable/Disable Event Report Acknowledge (EDEA).
  S2F38, "EnableDisableEventReportAcknowledge", 2, 38, false, None,
  BodySchema::Item(&items::ERACK)
}

function_schema! {
  /// ### S2F41
  ///
  /// Host Command Send (HCS).
  S2F41, "HostCommandSend", 2, 41, true, Some((2, 42)),
  BodySchema::List(&[
    BodySchema::Item(&items::RCMD),
    BodySchema::VarList(&BodySchema::List(&[
      BodySchema::Item(&items::CPNAME),
      BodySchema::Item(&items::CPVAL),
    ])),
  ])
}

function_schema! {
  /// ### S2F42
  ///
  /// Host Command Acknowledge (HCA).
  S2F42, "HostCommandAcknowledge", 2, 42, false, None,
  BodySchema::List(&[
    BodySchema::Item(&items::HCACK),
    BodySchema::VarList(&BodySchema::List(&[
      BodySchema::Item(&items::CPNAME),
      BodySchema::Item(&items::CPACK),
    ])),
  ])
}

// STREAM 5: EXCEPTION HANDLING

function_schema! {
  /// ### S5F1
  ///
  /// Alarm Report Send (ARS).
  S5F1, "AlarmReportSend", 5, 1, true, Some((5, 2)),
  BodySchema::List(&[
    BodySchema::Item(&items::ALCD),
    BodySchema::Item(&items::ALID),
    BodySchema::Item(&items::ALTX),
  ])
}

function_schema! {
  /// ### S5F2
  ///
  /// Alarm Report Acknowledge (ARA).
  S5F2, "AlarmReportAcknowledge", 5, 2, false, None,
  BodySchema::Item(&items::ACKC5)
}

function_schema! {
  /// ### S5F3
  ///
  /// Enable/Disable Alarm Send (EAS).
  S5F3, "EnableDisableAlarmSend", 5, 3, true, Some((5, 4)),
  BodySchema::List(&[
    BodySchema::Item(&items::ALED),
    BodySchema::Item(&items::ALID),
  ])
}

function_schema! {
  /// ### S5F4
  ///
  /// Enable/Disable Alarm Acknowledge (EAA).
  S5F4, "EnableDisableAlarmAcknowledge", 5, 4, false, None,
  BodySchema::Item(&items::ACKC5)
}

function_schema! {
  /// ### S5F5
  ///
  /// List Alarms Request (LAR). A zero-length list requests all alarms.
  S5F5, "ListAlarmsRequest", 5, 5, true, Some((5, 6)),
  BodySchema::VarList(&BodySchema::Item(&items::ALID))
}

function_schema! {
  /// ### S5F6
  ///
  /// List Alarms Data (LAD).
  S5F6, "ListAlarmsData", 5, 6, false, None,
  BodySchema::VarList(&BodySchema::List(&[
    BodySchema::Item(&items::ALCD),
    BodySchema::Item(&items::ALID),
    BodySchema::Item(&items::ALTX),
  ]))
}

// STREAM 6: DATA COLLECTION

function_schema! {
  /// ### S6F11
  ///
  /// Event Report Send (ERS).
  S6F11, "EventReportSend", 6, 11, true, Some((6, 12)),
  BodySchema::List(&[
    BodySchema::Item(&items::DATAID),
    BodySchema::Item(&items::CEID),
    BodySchema::VarList(&BodySchema::List(&[
      BodySchema::Item(&items::RPTID),
      BodySchema::VarList(&BodySchema::Any),
    ])),
  ])
}

function_schema! {
  /// ### S6F12
  ///
  /// Event Report Acknowledge (ERA).
  S6F12, "EventReportAcknowledge", 6, 12, false, None,
  BodySchema::Item(&items::ACKC6)
}

function_schema! {
  /// ### S6F15
  ///
  /// Event Report Request (ERR).
  S6F15, "EventReportRequest", 6, 15, true, Some((6, 16)),
  BodySchema::Item(&items::CEID)
}

function_schema! {
  /// ### S6F16
  ///
  /// Event Report Data (ERD).
  S6F16, "EventReportData", 6, 16, false, None,
  BodySchema::List(&[
    BodySchema::Item(&items::DATAID),
    BodySchema::Item(&items::CEID),
    BodySchema::VarList(&BodySchema::List(&[
      BodySchema::Item(&items::RPTID),
      BodySchema::VarList(&BodySchema::Any),
    ])),
  ])
}

// STREAM 9: SYSTEM ERRORS

function_schema! {
  /// ### S9F1
  ///
  /// Unrecognized Device ID (UDN). Carries the offending header.
  S9F1, "UnrecognizedDeviceId", 9, 1, false, None,
  BodySchema::Item(&items::MHEAD)
}

function_schema! {
  /// ### S9F3
  ///
  /// Unknown Function (USN). Carries the offending header. Sent when a
  /// message arrives for which no handler exists.
  S9F3, "UnknownFunction", 9, 3, false, None,
  BodySchema::Item(&items::MHEAD)
}

function_schema! {
  /// ### S9F5
  ///
  /// Unrecognized Data (UFN). Carries the offending header. Sent when a
  /// known function carries a body that fails its schema.
  S9F5, "UnrecognizedData", 9, 5, false, None,
  BodySchema::Item(&items::MHEAD)
}

function_schema! {
  /// ### S9F7
  ///
  /// Illegal Data (IDN). Carries the offending header. Sent when a body
  /// cannot be decoded at all.
  S9F7, "IllegalData", 9, 7, false, None,
  BodySchema::Item(&items::MHEAD)
}

function_schema! {
  /// ### S9F9
  ///
  /// Transaction Timer Timeout (TTN). Carries the stored header of the
  /// timed-out transaction.
  S9F9, "TransactionTimerTimeout", 9, 9, false, None,
  BodySchema::Item(&items::SHEAD)
}

function_schema! {
  /// ### S9F11
  ///
  /// Data Too Long (DLN). Carries the offending header.
  S9F11, "DataTooLong", 9, 11, false, None,
  BodySchema::Item(&items::MHEAD)
}

function_schema! {
  /// ### S9F13
  ///
  /// Conversation Timeout (CTN).
  S9F13, "ConversationTimeout", 9, 13, false, None,
  BodySchema::List(&[
    BodySchema::Item(&items::MEXP),
    BodySchema::Item(&items::EDID),
  ])
}

// STREAM 10: TERMINAL SERVICES

function_schema! {
  /// ### S10F1
  ///
  /// Terminal Request (TRN).
  S10F1, "TerminalRequest", 10, 1, true, Some((10, 2)),
  BodySchema::List(&[
    BodySchema::Item(&items::TID),
    BodySchema::Item(&items::TEXT),
  ])
}

function_schema! {
  /// ### S10F2
  ///
  /// Terminal Request Acknowledge (TRA).
  S10F2, "TerminalRequestAcknowledge", 10, 2, false, None,
  BodySchema::Item(&items::ACKC10)
}

function_schema! {
  /// ### S10F3
  ///
  /// Terminal Display, Single (VTN).
  S10F3, "TerminalDisplaySingle", 10, 3, true, Some((10, 4)),
  BodySchema::List(&[
    BodySchema::Item(&items::TID),
    BodySchema::Item(&items::TEXT),
  ])
}

function_schema! {
  /// ### S10F4
  ///
  /// Terminal Display, Single Acknowledge (VTA).
  S10F4, "TerminalDisplaySingleAcknowledge", 10, 4, false, None,
  BodySchema::Item(&items::ACKC10)
}

/// ### STANDARD CATALOGUE
///
/// Every entry the standard registry carries.
static STANDARD: &[&FunctionSchema] = &[
  &S1F1, &S1F2, &S1F3, &S1F4, &S1F11, &S1F12, &S1F13, &S1F14, &S1F15,
  &S1F16, &S1F17, &S1F18,
  &S2F13, &S2F14, &S2F15, &S2F16, &S2F17, &S2F18, &S2F29, &S2F30, &S2F31,
  &S2F32, &S2F33, &S2F34, &S2F35, &S2F36, &S2F37, &S2F38, &S2F41, &S2F42,
  &S5F1, &S5F2, &S5F3, &S5F4, &S5F5, &S5F6,
  &S6F11, &S6F12, &S6F15, &S6F16,
  &S9F1, &S9F3, &S9F5, &S9F7, &S9F9, &S9F11, &S9F13,
  &S10F1, &S10F2, &S10F3, &S10F4,
];

/// ## FUNCTION REGISTRY
///
/// The lookup table handed to the stack at construction. Immutable once
/// built, so readers share it without locking.
#[derive(Clone, Debug)]
pub struct FunctionRegistry {
  table: HashMap<(u8, u8), &'static FunctionSchema>,
}
impl FunctionRegistry {
  /// ### STANDARD REGISTRY
  ///
  /// Builds a registry holding the GEM-required message subset.
  pub fn standard() -> Self {
    let mut table = HashMap::with_capacity(STANDARD.len());
    for schema in STANDARD {
      table.insert((schema.stream, schema.function), *schema);
    }
    Self { table }
  }

  /// ### EMPTY REGISTRY
  pub fn empty() -> Self {
    Self { table: HashMap::new() }
  }

  /// ### EXTENDED REGISTRY
  ///
  /// Consumes the registry and returns one additionally holding the given
  /// entry. Meant for chaining at construction; there is no way to add an
  /// entry to a registry a stack already uses.
  pub fn with(mut self, schema: &'static FunctionSchema) -> Self {
    self.table.insert((schema.stream, schema.function), schema);
    self
  }

  /// ### LOOKUP
  pub fn lookup(&self, stream: u8, function: u8) -> Option<&'static FunctionSchema> {
    self.table.get(&(stream, function)).copied()
  }

  /// ### ENTRY COUNT
  pub fn len(&self) -> usize {
    self.table.len()
  }

  /// ### IS EMPTY
  pub fn is_empty(&self) -> bool {
    self.table.is_empty()
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::Item;

  #[test]
  fn standard_lookup() {
    let registry = FunctionRegistry::standard();
    let s1f13 = registry.lookup(1, 13).unwrap();
    assert_eq!(s1f13.name, "EstablishCommunicationsRequest");
    assert!(s1f13.w);
    assert_eq!(s1f13.secondary, Some((1, 14)));
    assert!(registry.lookup(99, 1).is_none());
  }

  #[test]
  fn primaries_are_odd_and_secondaries_follow() {
    let registry = FunctionRegistry::standard();
    for schema in STANDARD {
      if let Some((stream, function)) = schema.secondary {
        assert_eq!(schema.function % 2, 1, "{} primary must be odd", schema.name);
        assert_eq!(stream, schema.stream);
        assert_eq!(function, schema.function + 1);
        assert!(
          registry.lookup(stream, function).is_some(),
          "{} secondary missing from catalogue",
          schema.name,
        );
      }
      if schema.w {
        assert!(schema.secondary.is_some(), "{} expects a reply", schema.name);
      }
    }
  }

  #[test]
  fn s1f14_shape() {
    let registry = FunctionRegistry::standard();
    let schema = registry.lookup(1, 14).unwrap();
    let good = Item::List(vec![
      Item::bin(0),
      Item::List(vec![Item::ascii("model").unwrap(), Item::ascii("1.0").unwrap()]),
    ]);
    assert!(schema.body.validate(Some(&good)).is_ok());
    let also_good = Item::List(vec![Item::bin(0), Item::empty_list()]);
    assert!(schema.body.validate(Some(&also_good)).is_ok());
    let bad = Item::List(vec![Item::u1(0), Item::empty_list()]);
    assert!(schema.body.validate(Some(&bad)).is_err());
  }

  #[test]
  fn extension_entry() {
    static S64F1: FunctionSchema = FunctionSchema {
      stream: 64,
      function: 1,
      name: "ProcessDump",
      w: true,
      body: BodySchema::Any,
      secondary: Some((64, 2)),
    };
    let registry = FunctionRegistry::standard().with(&S64F1);
    assert_eq!(registry.lookup(64, 1).unwrap().name, "ProcessDump");
  }
}
