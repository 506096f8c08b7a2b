//! Operand stack and call stack.
//!
//! The operand stack is byte oriented: bytes and 4-byte words share the same storage, and
//! a word is pushed as its little-endian bytes, most significant byte on top. Underflows
//! are soft faults: they are logged, yield 0 and leave the stack untouched.

use tracing::error;

use crate::constants::{Address, Word};

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct OperandStack {
    bytes: Vec<u8>,
}

impl OperandStack {
    #[must_use]
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    pub fn push_byte(&mut self, value: u8) {
        self.bytes.push(value);
    }

    pub fn pop_byte(&mut self) -> u8 {
        self.bytes.pop().unwrap_or_else(|| {
            error!("Stack is empty");
            0
        })
    }

    #[must_use]
    pub fn peek_byte(&self) -> Option<u8> {
        self.bytes.last().copied()
    }

    pub fn push_word(&mut self, value: Word) {
        self.bytes.extend_from_slice(&value.to_le_bytes());
    }

    pub fn pop_word(&mut self) -> Word {
        let Some(start) = self.bytes.len().checked_sub(4) else {
            error!(depth = self.bytes.len(), "Stack is empty");
            return 0;
        };

        let mut word = [0; 4];
        word.copy_from_slice(&self.bytes[start..]);
        self.bytes.truncate(start);
        Word::from_le_bytes(word)
    }

    #[must_use]
    pub fn peek_word(&self) -> Option<Word> {
        let start = self.bytes.len().checked_sub(4)?;
        crate::util::read_word(&self.bytes, start)
    }

    /// Bytes of the stack, top first
    ///
    /// This is the layout seen through the stack region of the memory.
    pub fn view(&self) -> impl Iterator<Item = u8> + '_ {
        self.bytes.iter().rev().copied()
    }
}

/// Return addresses pushed by taken branches
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct CallStack {
    frames: Vec<Address>,
}

impl CallStack {
    pub fn push(&mut self, address: Address) {
        self.frames.push(address);
    }

    pub fn pop(&mut self) -> Option<Address> {
        self.frames.pop()
    }

    #[must_use]
    pub fn depth(&self) -> usize {
        self.frames.len()
    }

    /// Return addresses, innermost last
    #[must_use]
    pub fn frames(&self) -> &[Address] {
        &self.frames
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mixed_width_test() {
        let mut stack = OperandStack::default();
        stack.push_byte(0xAA);
        stack.push_word(0x1122_3344);
        assert_eq!(stack.len(), 5);
        assert_eq!(stack.peek_byte(), Some(0x11));
        assert_eq!(stack.peek_word(), Some(0x1122_3344));

        assert_eq!(stack.pop_word(), 0x1122_3344);
        assert_eq!(stack.pop_byte(), 0xAA);
        assert!(stack.is_empty());
    }

    #[test]
    fn word_bytes_are_popped_individually_test() {
        let mut stack = OperandStack::default();
        stack.push_word(0x0102_0304);
        let popped: Vec<u8> = (0..4).map(|_| stack.pop_byte()).collect();
        assert_eq!(popped, vec![1, 2, 3, 4]);
    }

    #[test]
    fn underflow_test() {
        let mut stack = OperandStack::default();
        assert_eq!(stack.pop_byte(), 0);

        // A partial word is not consumed
        stack.push_byte(7);
        stack.push_byte(8);
        assert_eq!(stack.pop_word(), 0);
        assert_eq!(stack.len(), 2);
        assert_eq!(stack.peek_word(), None);
    }

    #[test]
    fn view_is_top_first_test() {
        let mut stack = OperandStack::default();
        stack.push_byte(1);
        stack.push_byte(2);
        stack.push_byte(3);
        assert_eq!(stack.view().collect::<Vec<_>>(), vec![3, 2, 1]);
    }

    #[test]
    fn call_stack_test() {
        let mut calls = CallStack::default();
        assert_eq!(calls.pop(), None);
        calls.push(10);
        calls.push(20);
        assert_eq!(calls.depth(), 2);
        assert_eq!(calls.frames(), &[10, 20]);
        assert_eq!(calls.pop(), Some(20));
        assert_eq!(calls.depth(), 1);
    }
}
