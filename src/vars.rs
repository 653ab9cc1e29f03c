//! Variable, array and user-function storage plus the symbol table that
//! assigns stable slot indices the first time a name is encountered.

use std::collections::HashMap;

use crate::error::BasicError;
use crate::value::Value;

pub const MAX_VARIABLES: usize = 65536;
pub const MAX_ARRAYS: usize = 256;
pub const MAX_USER_FUNCTIONS: usize = 256;

pub const SYSTEM_VARS: [&str; 2] = ["INKEY$", "TIME$"];

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Symbol {
    Variable(u16),
    Array(u8),
    UserFunction(u8),
    SystemVar(u8),
}

#[derive(Debug, Clone)]
pub struct Variable {
    pub name: String,
    pub value: Value,
}

#[derive(Debug, Clone)]
pub struct Array {
    pub name: String,
    pub dimensions: Vec<i32>,
    pub value: Vec<Value>,
}

#[derive(Debug, Clone)]
pub struct UserFunction {
    pub name: String,
    pub parms: Vec<Variable>,
    pub body: Vec<u8>,
}

fn default_value_for(name: &str) -> Value {
    if name.ends_with('$') {
        Value::String(String::new())
    } else {
        Value::Number(0.0)
    }
}

pub struct VarStore {
    pub vars: Vec<Variable>,
    pub arrays: Vec<Array>,
    pub user_functions: Vec<UserFunction>,
    var_symbols: HashMap<String, u16>,
    array_symbols: HashMap<String, u8>,
    userfunc_symbols: HashMap<String, u8>,
}

impl VarStore {
    pub fn new() -> Self {
        VarStore {
            vars: Vec::new(),
            arrays: Vec::new(),
            user_functions: Vec::new(),
            var_symbols: HashMap::new(),
            array_symbols: HashMap::new(),
            userfunc_symbols: HashMap::new(),
        }
    }

    pub fn lookup_system_var(name: &str) -> Option<u8> {
        SYSTEM_VARS.iter().position(|s| *s == name).map(|i| i as u8)
    }

    /// Registers (or finds) `name` as a plain variable. Variables, arrays
    /// and user functions are separate namespaces (as in the source
    /// dialect): `A` and `A(...)` never collide.
    pub fn register_variable(&mut self, name: &str) -> Result<u16, BasicError> {
        if let Some(idx) = self.var_symbols.get(name) {
            return Ok(*idx);
        }
        if self.vars.len() >= MAX_VARIABLES {
            return Err(BasicError::TooManyVariables);
        }
        let idx = self.vars.len() as u16;
        self.vars.push(Variable { name: name.to_string(), value: default_value_for(name) });
        self.var_symbols.insert(name.to_string(), idx);
        Ok(idx)
    }

    pub fn register_array(&mut self, name: &str) -> Result<u8, BasicError> {
        if let Some(idx) = self.array_symbols.get(name) {
            return Ok(*idx);
        }
        if self.arrays.len() >= MAX_ARRAYS {
            return Err(BasicError::TooManyArrays);
        }
        let idx = self.arrays.len() as u8;
        self.arrays.push(default_array(name));
        self.array_symbols.insert(name.to_string(), idx);
        Ok(idx)
    }

    pub fn register_user_function(&mut self, name: &str) -> Result<u8, BasicError> {
        if let Some(idx) = self.userfunc_symbols.get(name) {
            return Ok(*idx);
        }
        if self.user_functions.len() >= MAX_USER_FUNCTIONS {
            return Err(BasicError::TooManyUserFunctions);
        }
        let idx = self.user_functions.len() as u8;
        self.user_functions.push(UserFunction { name: name.to_string(), parms: Vec::new(), body: Vec::new() });
        self.userfunc_symbols.insert(name.to_string(), idx);
        Ok(idx)
    }

    /// Looks up an already-registered symbol across all three namespaces,
    /// without registering a new one.
    pub fn lookup(&self, name: &str) -> Option<Symbol> {
        if let Some(idx) = self.var_symbols.get(name) {
            return Some(Symbol::Variable(*idx));
        }
        if let Some(idx) = self.array_symbols.get(name) {
            return Some(Symbol::Array(*idx));
        }
        if let Some(idx) = self.userfunc_symbols.get(name) {
            return Some(Symbol::UserFunction(*idx));
        }
        None
    }

    pub fn array_create(&mut self, idx: u8, dims: &[i32]) {
        let dimensions: Vec<i32> = dims.iter().map(|d| d + 1).collect();
        let size: usize = dimensions.iter().map(|d| *d as usize).product();
        let name = self.arrays[idx as usize].name.clone();
        let default = default_value_for(&name);
        self.arrays[idx as usize] = Array { name, dimensions, value: vec![default; size] };
    }

    pub fn array_flat_index(&self, idx: u8, indices: &[i32]) -> Result<usize, BasicError> {
        let array = &self.arrays[idx as usize];
        if indices.len() != array.dimensions.len() {
            return Err(BasicError::BadArrayIndex);
        }
        let mut flat: usize = 0;
        for (i, dim) in indices.iter().zip(array.dimensions.iter()) {
            if *i < 0 || *i >= *dim {
                return Err(BasicError::BadArrayIndex);
            }
            flat = flat * (*dim as usize) + (*i as usize);
        }
        Ok(flat)
    }

    pub fn array_get(&self, idx: u8, indices: &[i32]) -> Result<Value, BasicError> {
        let flat = self.array_flat_index(idx, indices)?;
        Ok(self.arrays[idx as usize].value[flat].clone())
    }

    pub fn array_set(&mut self, idx: u8, indices: &[i32], value: Value) -> Result<(), BasicError> {
        let flat = self.array_flat_index(idx, indices)?;
        self.arrays[idx as usize].value[flat] = value;
        Ok(())
    }

    /// `RUN`'s reset: variables, arrays (back to their default 10-bound
    /// size) and user-function bodies are wiped, but the symbol table
    /// itself (and therefore every slot index baked into stored
    /// statements) survives.
    pub fn reset_vars(&mut self) {
        for v in &mut self.vars {
            v.value = default_value_for(&v.name);
        }
        for a in &mut self.arrays {
            *a = default_array(&a.name);
        }
        for f in &mut self.user_functions {
            f.parms.clear();
            f.body.clear();
        }
    }

    /// `NEW`'s reset: every table, and the symbol table, start empty again.
    pub fn clear_all(&mut self) {
        self.vars.clear();
        self.arrays.clear();
        self.user_functions.clear();
        self.var_symbols.clear();
        self.array_symbols.clear();
        self.userfunc_symbols.clear();
    }
}

fn default_array(name: &str) -> Array {
    Array { name: name.to_string(), dimensions: vec![11], value: vec![default_value_for(name); 11] }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registers_stable_slots() {
        let mut store = VarStore::new();
        let a = store.register_variable("A").unwrap();
        let b = store.register_variable("B$").unwrap();
        let a_again = store.register_variable("A").unwrap();
        assert_eq!(a, a_again);
        assert_ne!(a, b);
        assert_eq!(store.vars[b as usize].value, Value::String(String::new()));
    }

    #[test]
    fn default_array_has_bound_ten() {
        let mut store = VarStore::new();
        let idx = store.register_array("A").unwrap();
        assert_eq!(store.arrays[idx as usize].value.len(), 11);
    }

    #[test]
    fn array_create_resizes_and_reinitializes() {
        let mut store = VarStore::new();
        let idx = store.register_array("A").unwrap();
        store.array_set(idx, &[3], Value::Number(9.0)).unwrap();
        store.array_create(idx, &[2, 2]);
        assert_eq!(store.arrays[idx as usize].value.len(), 9);
        assert_eq!(store.arrays[idx as usize].value[0], Value::Number(0.0));
    }

    #[test]
    fn reset_vars_keeps_slots_but_wipes_user_function_bodies() {
        let mut store = VarStore::new();
        let a = store.register_variable("A").unwrap();
        store.vars[a as usize].value = Value::Number(42.0);
        let f = store.register_user_function("FNX").unwrap();
        store.user_functions[f as usize].body = vec![1, 2, 3];
        store.reset_vars();
        assert_eq!(store.vars[a as usize].value, Value::Number(0.0));
        assert!(store.user_functions[f as usize].body.is_empty());
        assert_eq!(store.register_variable("A").unwrap(), a);
    }
}
