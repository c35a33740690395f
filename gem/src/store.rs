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

//! # VARIABLE STORE
//!
//! The application-provided home of equipment constants and status
//! variables. The stack treats both uniformly as identified [Item] values;
//! whether an id names a constant or a status variable is the
//! application's taxonomy, not the protocol's.
//!
//! [Item]: secs2::Item

use std::collections::BTreeMap;
use std::sync::RwLock;

use secs2::Item;

/// ## SET ACKNOWLEDGE
///
/// The outcome of a variable write, mapped onto the EAC codes of S2F16.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SetAck {
  /// The write landed.
  Ok,

  /// No variable has this id.
  UnknownId,

  /// The value falls outside the variable's limits.
  OutOfRange,
}

/// ## VARIABLE DESCRIPTION
///
/// What a namelist request reports about one variable.
#[derive(Clone, Debug)]
pub struct VariableInfo {
  pub id: u32,
  pub name: String,
  pub units: String,
  pub min: Option<Item>,
  pub max: Option<Item>,
}

/// ## VARIABLE STORE
///
/// The lookup interface the stack delegates S1F3, S1F11, S2F13, S2F15, and
/// S2F29 to. Implementations are shared across the receive task and
/// application threads, so mutation happens behind the implementor's own
/// interior locking.
pub trait VariableStore: Send + Sync {
  /// ### READ VARIABLE
  fn get(&self, id: u32) -> Option<Item>;

  /// ### WRITE VARIABLE
  fn set(&self, id: u32, value: Item) -> SetAck;

  /// ### LIST VARIABLES
  ///
  /// Every variable, ordered by id.
  fn list(&self) -> Vec<VariableInfo>;
}

/// ## VARIABLE
///
/// One entry of the in-memory store.
#[derive(Clone, Debug)]
pub struct Variable {
  pub name: String,
  pub units: String,
  pub value: Item,
  pub min: Option<Item>,
  pub max: Option<Item>,
}
impl Variable {
  /// ### NEW VARIABLE
  pub fn new(name: &str, units: &str, value: Item) -> Variable {
    Variable {
      name: name.into(),
      units: units.into(),
      value,
      min: None,
      max: None,
    }
  }
}

/// ## MEMORY STORE
///
/// The reference [Variable Store]: a b-tree of variables behind a
/// read-write lock. Suits demos, tests, and equipment whose variables fit
/// in memory.
///
/// [Variable Store]: VariableStore
#[derive(Default)]
pub struct MemoryStore {
  variables: RwLock<BTreeMap<u32, Variable>>,
}
impl MemoryStore {
  /// ### NEW EMPTY STORE
  pub fn new() -> MemoryStore {
    MemoryStore::default()
  }

  /// ### INSERT VARIABLE
  pub fn insert(&self, id: u32, variable: Variable) {
    self.variables.write().unwrap().insert(id, variable);
  }
}
impl VariableStore for MemoryStore {
  fn get(&self, id: u32) -> Option<Item> {
    self
      .variables
      .read()
      .unwrap()
      .get(&id)
      .map(|variable| variable.value.clone())
  }

  fn set(&self, id: u32, value: Item) -> SetAck {
    let mut variables = self.variables.write().unwrap();
    match variables.get_mut(&id) {
      None => SetAck::UnknownId,
      Some(variable) => {
        variable.value = value;
        SetAck::Ok
      }
    }
  }

  fn list(&self) -> Vec<VariableInfo> {
    self
      .variables
      .read()
      .unwrap()
      .iter()
      .map(|(id, variable)| VariableInfo {
        id: *id,
        name: variable.name.clone(),
        units: variable.units.clone(),
        min: variable.min.clone(),
        max: variable.max.clone(),
      })
      .collect()
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn get_set_list() {
    let store = MemoryStore::new();
    store.insert(10, Variable::new("Temperature", "degC", Item::f4(21.5)));
    store.insert(11, Variable::new("LotId", "", Item::ascii("LOT-1").unwrap()));

    assert_eq!(store.get(10), Some(Item::f4(21.5)));
    assert_eq!(store.get(99), None);

    assert_eq!(store.set(10, Item::f4(22.0)), SetAck::Ok);
    assert_eq!(store.get(10), Some(Item::f4(22.0)));
    assert_eq!(store.set(99, Item::u1(0)), SetAck::UnknownId);

    let listing = store.list();
    assert_eq!(listing.len(), 2);
    assert_eq!(listing[0].id, 10);
    assert_eq!(listing[0].name, "Temperature");
    assert_eq!(listing[1].id, 11);
  }
}
