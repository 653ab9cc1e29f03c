//! The tagged byte wire format shared by statement payloads and expression
//! bodies. One byte of tag, then tag-specific payload — this is the format
//! the lister and the round-trip property in the testable properties depend
//! on, so it is kept exactly as laid out even though the in-memory
//! representation here is a typed enum, not a raw pointer walk.

use crate::error::BasicError;

#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    None,
    Number(f32),
    Str(String),
    Op(u8),
    Variable(u16),
    Array(u8),
    SystemVar(u8),
    Function(u8),
    UserFunction(u8),
    Expression(Vec<Token>),
    Parameter(String),
    ParameterRef(u8),
}

const TAG_NONE: u8 = 0;
const TAG_NUMBER: u8 = 1;
const TAG_STRING: u8 = 2;
const TAG_OP: u8 = 3;
const TAG_VARIABLE: u8 = 4;
const TAG_ARRAY: u8 = 5;
const TAG_SYSTEMVAR: u8 = 6;
const TAG_FUNCTION: u8 = 7;
const TAG_USERFUNCTION: u8 = 8;
const TAG_EXPRESSION: u8 = 9;
const TAG_PARAMETER: u8 = 10;
const TAG_PARAMETERREF: u8 = 11;

impl Token {
    pub fn encode(&self, out: &mut Vec<u8>) {
        match self {
            Token::None => out.push(TAG_NONE),
            Token::Number(n) => {
                out.push(TAG_NUMBER);
                out.extend_from_slice(&n.to_le_bytes());
            }
            Token::Str(s) => {
                out.push(TAG_STRING);
                encode_bytes(out, s.as_bytes());
            }
            Token::Op(idx) => {
                out.push(TAG_OP);
                out.push(*idx);
            }
            Token::Variable(idx) => {
                out.push(TAG_VARIABLE);
                out.extend_from_slice(&idx.to_le_bytes());
            }
            Token::Array(idx) => {
                out.push(TAG_ARRAY);
                out.push(*idx);
            }
            Token::SystemVar(idx) => {
                out.push(TAG_SYSTEMVAR);
                out.push(*idx);
            }
            Token::Function(idx) => {
                out.push(TAG_FUNCTION);
                out.push(*idx);
            }
            Token::UserFunction(idx) => {
                out.push(TAG_USERFUNCTION);
                out.push(*idx);
            }
            Token::Expression(tokens) => {
                out.push(TAG_EXPRESSION);
                let mut body = Vec::new();
                for t in tokens {
                    t.encode(&mut body);
                }
                encode_bytes(out, &body);
            }
            Token::Parameter(name) => {
                out.push(TAG_PARAMETER);
                encode_bytes(out, name.as_bytes());
            }
            Token::ParameterRef(idx) => {
                out.push(TAG_PARAMETERREF);
                out.push(*idx);
            }
        }
    }
}

fn encode_bytes(out: &mut Vec<u8>, bytes: &[u8]) {
    out.push(bytes.len() as u8);
    out.extend_from_slice(bytes);
}

/// A cursor over an encoded token/payload byte slice.
pub struct TokenReader<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> TokenReader<'a> {
    pub fn new(bytes: &'a [u8]) -> Self {
        TokenReader { bytes, pos: 0 }
    }

    pub fn at_end(&self) -> bool {
        self.pos >= self.bytes.len()
    }

    pub fn remaining(&self) -> usize {
        self.bytes.len() - self.pos
    }

    pub fn peek_tag(&self) -> Option<u8> {
        self.bytes.get(self.pos).copied()
    }

    fn take_u8(&mut self) -> Result<u8, BasicError> {
        let b = *self.bytes.get(self.pos).ok_or(BasicError::MalformedExpression)?;
        self.pos += 1;
        Ok(b)
    }

    fn take_n(&mut self, n: usize) -> Result<&'a [u8], BasicError> {
        let slice = self.bytes.get(self.pos..self.pos + n).ok_or(BasicError::MalformedExpression)?;
        self.pos += n;
        Ok(slice)
    }

    fn take_bytes(&mut self) -> Result<&'a [u8], BasicError> {
        let len = self.take_u8()? as usize;
        self.take_n(len)
    }

    pub fn decode(&mut self) -> Result<Token, BasicError> {
        let tag = self.take_u8()?;
        match tag {
            TAG_NONE => Ok(Token::None),
            TAG_NUMBER => {
                let bytes = self.take_n(4)?;
                Ok(Token::Number(f32::from_le_bytes(bytes.try_into().unwrap())))
            }
            TAG_STRING => {
                let bytes = self.take_bytes()?;
                Ok(Token::Str(String::from_utf8_lossy(bytes).into_owned()))
            }
            TAG_OP => Ok(Token::Op(self.take_u8()?)),
            TAG_VARIABLE => {
                let bytes = self.take_n(2)?;
                Ok(Token::Variable(u16::from_le_bytes(bytes.try_into().unwrap())))
            }
            TAG_ARRAY => Ok(Token::Array(self.take_u8()?)),
            TAG_SYSTEMVAR => Ok(Token::SystemVar(self.take_u8()?)),
            TAG_FUNCTION => Ok(Token::Function(self.take_u8()?)),
            TAG_USERFUNCTION => Ok(Token::UserFunction(self.take_u8()?)),
            TAG_EXPRESSION => {
                let bytes = self.take_bytes()?;
                let mut reader = TokenReader::new(bytes);
                let mut tokens = Vec::new();
                while !reader.at_end() {
                    tokens.push(reader.decode()?);
                }
                Ok(Token::Expression(tokens))
            }
            TAG_PARAMETER => {
                let bytes = self.take_bytes()?;
                Ok(Token::Parameter(String::from_utf8_lossy(bytes).into_owned()))
            }
            TAG_PARAMETERREF => Ok(Token::ParameterRef(self.take_u8()?)),
            _ => Err(BasicError::MalformedExpression),
        }
    }

    pub fn decode_line_num(&mut self) -> Result<i32, BasicError> {
        let bytes = self.take_n(2)?;
        Ok(i16::from_le_bytes(bytes.try_into().unwrap()) as i32)
    }

    pub fn take_remaining(&mut self) -> &'a [u8] {
        let s = &self.bytes[self.pos..];
        self.pos = self.bytes.len();
        s
    }
}

pub fn encode_line_num(out: &mut Vec<u8>, line: i32) {
    out.extend_from_slice(&(line as i16).to_le_bytes());
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_scalar_tokens() {
        let tokens = vec![
            Token::Number(3.5),
            Token::Str("hi".into()),
            Token::Variable(12),
            Token::Op(4),
        ];
        let mut bytes = Vec::new();
        for t in &tokens {
            t.encode(&mut bytes);
        }
        let mut reader = TokenReader::new(&bytes);
        for expected in &tokens {
            assert_eq!(&reader.decode().unwrap(), expected);
        }
        assert!(reader.at_end());
    }

    #[test]
    fn round_trips_nested_expression() {
        let nested = Token::Expression(vec![Token::Number(1.0), Token::Op(4), Token::Number(2.0)]);
        let mut bytes = Vec::new();
        nested.encode(&mut bytes);
        let mut reader = TokenReader::new(&bytes);
        assert_eq!(reader.decode().unwrap(), nested);
    }
}
