//! Single-account virtual ledger for replaying read-only getters.
//!
//! A [`Blockchain`] holds exactly one account (code, storage, balance) plus a
//! virtual timestamp, and executes named getters against it with a small
//! deterministic stack machine. Nothing here touches the network or disk, and
//! nothing is persisted between invocations: every `run_get_method` call
//! starts from the same frozen state.
//!
//! Method table layout: the code cell's first reference starts a linked list
//! of method entries. Each entry's payload is `[name_len u8][name][bytecode]`
//! and its first reference points at the next entry.

use alloy_primitives::U256;
use std::sync::Arc;
use thiserror::Error;

use crate::boc::{Cell, CellSlice};
use crate::types::ContractAddress;

/// Bytecode opcodes understood by the getter interpreter.
pub mod ops {
    /// Stop; the current stack is the result
    pub const RET: u8 = 0x00;
    /// `[len u8][len bytes BE]` — push an integer literal
    pub const PUSHINT: u8 = 0x01;
    /// `[idx u8]` — push a copy of invocation argument `idx`
    pub const PUSHARG: u8 = 0x02;
    /// Push the account's storage root cell
    pub const PUSHDATA: u8 = 0x03;
    /// Pop a cell, push a read slice over its payload
    pub const CTOS: u8 = 0x04;
    /// `[idx u8]` — pop a cell, push its `idx`-th child cell
    pub const PUSHREF: u8 = 0x05;
    /// Pop a dictionary cell then a key; push a slice over the matching
    /// entry's payload, or trap with exit code 10 if the key is absent
    pub const DICTGET: u8 = 0x06;
    /// `[n u8]` — pop a slice, push the next `n` bytes as an integer,
    /// then push the advanced slice
    pub const LDU: u8 = 0x07;
    /// Pop the top of the stack
    pub const DROP: u8 = 0x08;
    /// Pop the item directly under the top of the stack
    pub const NIP: u8 = 0x09;
    /// Push the ledger's virtual timestamp
    pub const NOW: u8 = 0x0a;
    /// `[code u8]` — trap with the given exit code
    pub const THROW: u8 = 0x0b;
}

/// Execution budget per invocation; dictionary walks are charged per entry.
const GAS_LIMIT: usize = 10_000;

/// Exit code raised when a dictionary lookup misses.
const EXIT_DICT_MISS: i32 = 10;
/// Exit code raised when a cell or slice lacks the requested content.
const EXIT_CELL_UNDERFLOW: i32 = 9;

/// A typed value on the interpreter stack.
#[derive(Debug, Clone, PartialEq)]
pub enum StackValue {
    Int(U256),
    Cell(Arc<Cell>),
    Slice(CellSlice),
}

#[derive(Debug, Error, PartialEq)]
pub enum GetterCallError {
    #[error("method {0:?} not found")]
    MethodNotFound(String),
    #[error("malformed method table")]
    MalformedMethodTable,
    #[error("unknown opcode {0:#04x}")]
    BadOpcode(u8),
    #[error("bytecode ended mid-instruction")]
    TruncatedCode,
    #[error("bad immediate operand for opcode {0:#04x}")]
    BadImmediate(u8),
    #[error("stack underflow in {op}")]
    StackUnderflow { op: &'static str },
    #[error("{op} expected {expected} on the stack")]
    TypeMismatch { op: &'static str, expected: &'static str },
    #[error("no invocation argument at index {0}")]
    ArgOutOfRange(usize),
    #[error("method trapped with exit code {exit_code}")]
    Trap { exit_code: i32 },
    #[error("execution exceeded the gas budget")]
    OutOfGas,
    #[error("result stack has {found} items, expected at least {expected}")]
    ShortStack { expected: usize, found: usize },
}

/// The one account installed on a virtual ledger.
#[derive(Debug, Clone)]
pub struct ShardAccount {
    pub address: ContractAddress,
    pub code: Arc<Cell>,
    pub data: Arc<Cell>,
    pub balance: u128,
}

/// Isolated virtual ledger holding a single account at a fixed point in time.
#[derive(Debug, Clone)]
pub struct Blockchain {
    account: ShardAccount,
    now: u32,
}

impl Blockchain {
    pub fn new(account: ShardAccount, now: u32) -> Self {
        Self { account, now }
    }

    pub fn account(&self) -> &ShardAccount {
        &self.account
    }

    pub fn now(&self) -> u32 {
        self.now
    }

    /// Execute a named read-only method and return its result stack in
    /// push order.
    pub fn run_get_method(
        &self,
        name: &str,
        args: &[StackValue],
    ) -> Result<Vec<StackValue>, GetterCallError> {
        let bytecode = self.find_method(name)?;
        self.execute(&bytecode, args)
    }

    /// Walk the method table for `name`, returning its bytecode.
    fn find_method(&self, name: &str) -> Result<Vec<u8>, GetterCallError> {
        let mut entry = self.account.code.reference(0).cloned();
        let mut visited = 0usize;
        while let Some(cell) = entry {
            visited += 1;
            if visited > GAS_LIMIT {
                return Err(GetterCallError::OutOfGas);
            }
            let data = cell.data();
            let name_len = *data.first().ok_or(GetterCallError::MalformedMethodTable)? as usize;
            if data.len() < 1 + name_len {
                return Err(GetterCallError::MalformedMethodTable);
            }
            if &data[1..1 + name_len] == name.as_bytes() {
                return Ok(data[1 + name_len..].to_vec());
            }
            entry = cell.reference(0).cloned();
        }
        Err(GetterCallError::MethodNotFound(name.to_string()))
    }

    fn execute(
        &self,
        bytecode: &[u8],
        args: &[StackValue],
    ) -> Result<Vec<StackValue>, GetterCallError> {
        let mut stack: Vec<StackValue> = Vec::new();
        let mut pc = 0usize;
        let mut gas = 0usize;

        let fetch = |pc: &mut usize| -> Result<u8, GetterCallError> {
            let byte = *bytecode.get(*pc).ok_or(GetterCallError::TruncatedCode)?;
            *pc += 1;
            Ok(byte)
        };

        while pc < bytecode.len() {
            gas += 1;
            if gas > GAS_LIMIT {
                return Err(GetterCallError::OutOfGas);
            }
            let op = fetch(&mut pc)?;
            match op {
                ops::RET => break,
                ops::PUSHINT => {
                    let len = fetch(&mut pc)? as usize;
                    if len == 0 || len > 32 {
                        return Err(GetterCallError::BadImmediate(op));
                    }
                    if pc + len > bytecode.len() {
                        return Err(GetterCallError::TruncatedCode);
                    }
                    stack.push(StackValue::Int(U256::from_be_slice(&bytecode[pc..pc + len])));
                    pc += len;
                }
                ops::PUSHARG => {
                    let idx = fetch(&mut pc)? as usize;
                    let arg = args.get(idx).ok_or(GetterCallError::ArgOutOfRange(idx))?;
                    stack.push(arg.clone());
                }
                ops::PUSHDATA => {
                    stack.push(StackValue::Cell(self.account.data.clone()));
                }
                ops::CTOS => {
                    let cell = pop_cell(&mut stack, "CTOS")?;
                    stack.push(StackValue::Slice(CellSlice::new(cell)));
                }
                ops::PUSHREF => {
                    let idx = fetch(&mut pc)? as usize;
                    let cell = pop_cell(&mut stack, "PUSHREF")?;
                    let child = cell.reference(idx).ok_or(GetterCallError::Trap {
                        exit_code: EXIT_CELL_UNDERFLOW,
                    })?;
                    stack.push(StackValue::Cell(child.clone()));
                }
                ops::DICTGET => {
                    let dict = pop_cell(&mut stack, "DICTGET")?;
                    let key = pop_int(&mut stack, "DICTGET")?;
                    let value = dict_lookup(&dict, key, &mut gas)?;
                    stack.push(StackValue::Slice(value));
                }
                ops::LDU => {
                    let n = fetch(&mut pc)? as usize;
                    if n == 0 || n > 32 {
                        return Err(GetterCallError::BadImmediate(op));
                    }
                    let mut slice = pop_slice(&mut stack, "LDU")?;
                    let value = slice.load_be_uint(n).ok_or(GetterCallError::Trap {
                        exit_code: EXIT_CELL_UNDERFLOW,
                    })?;
                    stack.push(StackValue::Int(value));
                    stack.push(StackValue::Slice(slice));
                }
                ops::DROP => {
                    stack
                        .pop()
                        .ok_or(GetterCallError::StackUnderflow { op: "DROP" })?;
                }
                ops::NIP => {
                    if stack.len() < 2 {
                        return Err(GetterCallError::StackUnderflow { op: "NIP" });
                    }
                    stack.remove(stack.len() - 2);
                }
                ops::NOW => {
                    stack.push(StackValue::Int(U256::from(self.now)));
                }
                ops::THROW => {
                    let exit_code = fetch(&mut pc)? as i32;
                    return Err(GetterCallError::Trap { exit_code });
                }
                other => return Err(GetterCallError::BadOpcode(other)),
            }
        }
        Ok(stack)
    }
}

/// Walk a dictionary's linked entry list for `key`; each entry's payload is
/// `[key 32 bytes][value bytes]` with the next entry in reference 0.
fn dict_lookup(
    dict: &Arc<Cell>,
    key: U256,
    gas: &mut usize,
) -> Result<CellSlice, GetterCallError> {
    let key_bytes = key.to_be_bytes::<32>();
    let mut entry = Some(dict.clone());
    while let Some(cell) = entry {
        *gas += 1;
        if *gas > GAS_LIMIT {
            return Err(GetterCallError::OutOfGas);
        }
        let data = cell.data();
        if data.len() >= 32 && data[..32] == key_bytes {
            return Ok(CellSlice::with_offset(cell, 32));
        }
        entry = cell.reference(0).cloned();
    }
    Err(GetterCallError::Trap {
        exit_code: EXIT_DICT_MISS,
    })
}

fn pop_cell(stack: &mut Vec<StackValue>, op: &'static str) -> Result<Arc<Cell>, GetterCallError> {
    match stack.pop() {
        Some(StackValue::Cell(cell)) => Ok(cell),
        Some(_) => Err(GetterCallError::TypeMismatch {
            op,
            expected: "cell",
        }),
        None => Err(GetterCallError::StackUnderflow { op }),
    }
}

fn pop_int(stack: &mut Vec<StackValue>, op: &'static str) -> Result<U256, GetterCallError> {
    match stack.pop() {
        Some(StackValue::Int(value)) => Ok(value),
        Some(_) => Err(GetterCallError::TypeMismatch {
            op,
            expected: "integer",
        }),
        None => Err(GetterCallError::StackUnderflow { op }),
    }
}

fn pop_slice(stack: &mut Vec<StackValue>, op: &'static str) -> Result<CellSlice, GetterCallError> {
    match stack.pop() {
        Some(StackValue::Slice(slice)) => Ok(slice),
        Some(_) => Err(GetterCallError::TypeMismatch {
            op,
            expected: "slice",
        }),
        None => Err(GetterCallError::StackUnderflow { op }),
    }
}

/// Read the integer at `idx` of a result stack, erroring if the stack is
/// shorter than a getter's return convention requires.
pub fn stack_int(stack: &[StackValue], idx: usize) -> Result<U256, GetterCallError> {
    match stack.get(idx) {
        Some(StackValue::Int(value)) => Ok(*value),
        Some(_) => Err(GetterCallError::TypeMismatch {
            op: "result",
            expected: "integer",
        }),
        None => Err(GetterCallError::ShortStack {
            expected: idx + 1,
            found: stack.len(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ContractAddress;
    use alloy_primitives::B256;

    fn cell(data: Vec<u8>, refs: Vec<Arc<Cell>>) -> Arc<Cell> {
        Arc::new(Cell::new(data, refs).unwrap())
    }

    fn method(name: &str, bytecode: &[u8], next: Option<Arc<Cell>>) -> Arc<Cell> {
        let mut data = vec![name.len() as u8];
        data.extend(name.as_bytes());
        data.extend(bytecode);
        cell(data, next.into_iter().collect())
    }

    fn ledger(code: Arc<Cell>, data: Arc<Cell>) -> Blockchain {
        let address = ContractAddress {
            workchain: 0,
            hash: B256::ZERO,
        };
        Blockchain::new(
            ShardAccount {
                address,
                code,
                data,
                balance: 100,
            },
            1_700_000_000,
        )
    }

    /// Storage with one dictionary in ref 0, entries keyed by small ints.
    fn storage_with_dict(entries: &[(u64, &[u8])]) -> Arc<Cell> {
        let mut next = None;
        for (key, value) in entries.iter().rev() {
            let mut data = U256::from(*key).to_be_bytes::<32>().to_vec();
            data.extend(*value);
            next = Some(cell(data, next.into_iter().collect()));
        }
        cell(vec![], next.into_iter().collect())
    }

    #[test]
    fn test_missing_method() {
        let code = cell(vec![], vec![method("foo", &[ops::RET], None)]);
        let chain = ledger(code, cell(vec![], vec![]));
        assert_eq!(
            chain.run_get_method("bar", &[]),
            Err(GetterCallError::MethodNotFound("bar".into()))
        );
    }

    #[test]
    fn test_push_and_return() {
        let code = cell(
            vec![],
            vec![method("answer", &[ops::PUSHINT, 1, 42, ops::RET], None)],
        );
        let chain = ledger(code, cell(vec![], vec![]));
        let stack = chain.run_get_method("answer", &[]).unwrap();
        assert_eq!(stack, vec![StackValue::Int(U256::from(42))]);
    }

    #[test]
    fn test_dict_lookup_through_getter() {
        let bytecode = [
            ops::PUSHARG, 0,
            ops::PUSHDATA,
            ops::PUSHREF, 0,
            ops::DICTGET,
            ops::LDU, 16,
            ops::DROP,
            ops::RET,
        ];
        let code = cell(vec![], vec![method("lookup", &bytecode, None)]);
        let reserve = 5_000_000_000u128.to_be_bytes();
        let data = storage_with_dict(&[(1, &reserve), (2, &7u128.to_be_bytes())]);
        let chain = ledger(code, data);

        let stack = chain
            .run_get_method("lookup", &[StackValue::Int(U256::from(1))])
            .unwrap();
        assert_eq!(stack, vec![StackValue::Int(U256::from(5_000_000_000u64))]);

        // Absent key traps with the dictionary miss exit code
        let err = chain
            .run_get_method("lookup", &[StackValue::Int(U256::from(3))])
            .unwrap_err();
        assert_eq!(err, GetterCallError::Trap { exit_code: 10 });
    }

    #[test]
    fn test_two_value_return_order() {
        // Skip a 16-byte field, then load supply and borrow
        let bytecode = [
            ops::PUSHARG, 0,
            ops::PUSHDATA,
            ops::PUSHREF, 0,
            ops::DICTGET,
            ops::LDU, 16, ops::NIP,
            ops::LDU, 16,
            ops::LDU, 16,
            ops::DROP,
            ops::RET,
        ];
        let code = cell(vec![], vec![method("totals", &bytecode, None)]);
        let mut value = Vec::new();
        value.extend(1u128.to_be_bytes());
        value.extend(20u128.to_be_bytes());
        value.extend(30u128.to_be_bytes());
        let chain = ledger(code, storage_with_dict(&[(9, &value)]));

        let stack = chain
            .run_get_method("totals", &[StackValue::Int(U256::from(9))])
            .unwrap();
        assert_eq!(stack_int(&stack, 0), Ok(U256::from(20)));
        assert_eq!(stack_int(&stack, 1), Ok(U256::from(30)));
        assert_eq!(
            stack_int(&stack, 2),
            Err(GetterCallError::ShortStack {
                expected: 3,
                found: 2
            })
        );
    }

    #[test]
    fn test_trap_propagates_exit_code() {
        let code = cell(vec![], vec![method("boom", &[ops::THROW, 77], None)]);
        let chain = ledger(code, cell(vec![], vec![]));
        assert_eq!(
            chain.run_get_method("boom", &[]),
            Err(GetterCallError::Trap { exit_code: 77 })
        );
    }

    #[test]
    fn test_now_is_virtual_time() {
        let code = cell(vec![], vec![method("time", &[ops::NOW, ops::RET], None)]);
        let chain = ledger(code, cell(vec![], vec![]));
        assert_eq!(chain.now(), 1_700_000_000);
        assert_eq!(chain.account().balance, 100);
        let stack = chain.run_get_method("time", &[]).unwrap();
        assert_eq!(stack, vec![StackValue::Int(U256::from(1_700_000_000u64))]);

        // Same state, same timestamp: identical result
        assert_eq!(chain.run_get_method("time", &[]).unwrap(), stack);
    }

    #[test]
    fn test_ctos_reads_storage_payload() {
        let bytecode = [ops::PUSHDATA, ops::CTOS, ops::LDU, 4, ops::DROP, ops::RET];
        let code = cell(vec![], vec![method("head", &bytecode, None)]);
        let chain = ledger(code, cell(vec![0, 0, 1, 7], vec![]));
        let stack = chain.run_get_method("head", &[]).unwrap();
        assert_eq!(stack, vec![StackValue::Int(U256::from(0x0107u32))]);
    }

    #[test]
    fn test_bad_argument_index() {
        let code = cell(vec![], vec![method("echo", &[ops::PUSHARG, 1], None)]);
        let chain = ledger(code, cell(vec![], vec![]));
        assert_eq!(
            chain.run_get_method("echo", &[StackValue::Int(U256::ZERO)]),
            Err(GetterCallError::ArgOutOfRange(1))
        );
    }

    #[test]
    fn test_type_mismatch() {
        // LDU on an integer
        let code = cell(
            vec![],
            vec![method("bad", &[ops::PUSHINT, 1, 5, ops::LDU, 1], None)],
        );
        let chain = ledger(code, cell(vec![], vec![]));
        assert_eq!(
            chain.run_get_method("bad", &[]),
            Err(GetterCallError::TypeMismatch {
                op: "LDU",
                expected: "slice"
            })
        );
    }
}
