use crate::error::{DmError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Keyword {
    And,
    Or,
    Not,
    Is,
    Null,
    In,
    Like,
    ILike,
    True,
    False,
}

fn keyword_from_str(word: &str) -> Option<Keyword> {
    let keyword = match word.to_ascii_uppercase().as_str() {
        "AND" => Keyword::And,
        "OR" => Keyword::Or,
        "NOT" => Keyword::Not,
        "IS" => Keyword::Is,
        "NULL" => Keyword::Null,
        "IN" => Keyword::In,
        "LIKE" => Keyword::Like,
        "ILIKE" => Keyword::ILike,
        "TRUE" => Keyword::True,
        "FALSE" => Keyword::False,
        _ => return None,
    };
    Some(keyword)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Op {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    Plus,
    Minus,
    Star,
    Slash,
    Percent,
    Concat,
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum TokenKind {
    Int(i64),
    Float(f64),
    Str(String),
    /// 裸の識別子（列名または関数名）
    Ident(String),
    /// ダブルクォートで囲んだ列名
    QuotedIdent(String),
    /// `$area` などの変数（`$` を除いた名前）
    Variable(String),
    Keyword(Keyword),
    Op(Op),
    LParen,
    RParen,
    Comma,
    Eof,
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Token {
    pub kind: TokenKind,
    /// 文字単位の開始位置
    pub pos: usize,
}

pub(crate) fn tokenize(text: &str) -> Result<Vec<Token>> {
    let chars: Vec<char> = text.chars().collect();
    let mut tokens = Vec::new();
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        let start = i;

        if c.is_whitespace() {
            i += 1;
            continue;
        }

        let kind = match c {
            '(' => {
                i += 1;
                TokenKind::LParen
            }
            ')' => {
                i += 1;
                TokenKind::RParen
            }
            ',' => {
                i += 1;
                TokenKind::Comma
            }
            '+' | '-' | '*' | '/' | '%' => {
                i += 1;
                TokenKind::Op(match c {
                    '+' => Op::Plus,
                    '-' => Op::Minus,
                    '*' => Op::Star,
                    '/' => Op::Slash,
                    _ => Op::Percent,
                })
            }
            '=' => {
                i += if chars.get(i + 1) == Some(&'=') { 2 } else { 1 };
                TokenKind::Op(Op::Eq)
            }
            '!' => {
                if chars.get(i + 1) != Some(&'=') {
                    return Err(DmError::expression("expected '=' after '!'", i));
                }
                i += 2;
                TokenKind::Op(Op::Ne)
            }
            '<' => match chars.get(i + 1) {
                Some('=') => {
                    i += 2;
                    TokenKind::Op(Op::Le)
                }
                Some('>') => {
                    i += 2;
                    TokenKind::Op(Op::Ne)
                }
                _ => {
                    i += 1;
                    TokenKind::Op(Op::Lt)
                }
            },
            '>' => {
                if chars.get(i + 1) == Some(&'=') {
                    i += 2;
                    TokenKind::Op(Op::Ge)
                } else {
                    i += 1;
                    TokenKind::Op(Op::Gt)
                }
            }
            '|' => {
                if chars.get(i + 1) != Some(&'|') {
                    return Err(DmError::expression("expected '||'", i));
                }
                i += 2;
                TokenKind::Op(Op::Concat)
            }
            '\'' => {
                let (value, next) = read_quoted(&chars, i, '\'')
                    .ok_or_else(|| DmError::expression("unterminated string literal", start))?;
                i = next;
                TokenKind::Str(value)
            }
            '"' => {
                let (value, next) = read_quoted(&chars, i, '"')
                    .ok_or_else(|| DmError::expression("unterminated quoted column", start))?;
                i = next;
                TokenKind::QuotedIdent(value)
            }
            '$' => {
                i += 1;
                let name = read_word(&chars, &mut i);
                if name.is_empty() {
                    return Err(DmError::expression("expected variable name after '$'", start));
                }
                TokenKind::Variable(name.to_ascii_lowercase())
            }
            c if c.is_ascii_digit() || (c == '.' && next_is_digit(&chars, i)) => {
                read_number(&chars, &mut i)?
            }
            c if c.is_alphabetic() || c == '_' => {
                let word = read_word(&chars, &mut i);
                match keyword_from_str(&word) {
                    Some(keyword) => TokenKind::Keyword(keyword),
                    None => TokenKind::Ident(word),
                }
            }
            other => {
                return Err(DmError::expression(
                    format!("unexpected character '{}'", other),
                    start,
                ))
            }
        };
        tokens.push(Token { kind, pos: start });
    }

    tokens.push(Token {
        kind: TokenKind::Eof,
        pos: chars.len(),
    });
    Ok(tokens)
}

fn next_is_digit(chars: &[char], i: usize) -> bool {
    chars.get(i + 1).is_some_and(|c| c.is_ascii_digit())
}

/// 引用符で囲まれた文字列。引用符の2連続はエスケープ
fn read_quoted(chars: &[char], start: usize, quote: char) -> Option<(String, usize)> {
    let mut value = String::new();
    let mut i = start + 1;
    while i < chars.len() {
        if chars[i] == quote {
            if chars.get(i + 1) == Some(&quote) {
                value.push(quote);
                i += 2;
                continue;
            }
            return Some((value, i + 1));
        }
        value.push(chars[i]);
        i += 1;
    }
    None
}

fn read_word(chars: &[char], i: &mut usize) -> String {
    let start = *i;
    while *i < chars.len() && (chars[*i].is_alphanumeric() || chars[*i] == '_') {
        *i += 1;
    }
    chars[start..*i].iter().collect()
}

fn read_number(chars: &[char], i: &mut usize) -> Result<TokenKind> {
    let start = *i;
    let mut is_float = false;
    while *i < chars.len() {
        let c = chars[*i];
        if c.is_ascii_digit() {
            *i += 1;
        } else if c == '.' && !is_float {
            is_float = true;
            *i += 1;
        } else if (c == 'e' || c == 'E') && *i > start {
            // 指数表記
            let mut j = *i + 1;
            if matches!(chars.get(j), Some('+') | Some('-')) {
                j += 1;
            }
            if !chars.get(j).is_some_and(|c| c.is_ascii_digit()) {
                break;
            }
            is_float = true;
            *i = j;
            while *i < chars.len() && chars[*i].is_ascii_digit() {
                *i += 1;
            }
            break;
        } else {
            break;
        }
    }

    let text: String = chars[start..*i].iter().collect();
    if is_float {
        text.parse()
            .map(TokenKind::Float)
            .map_err(|_| DmError::expression(format!("invalid number '{}'", text), start))
    } else {
        match text.parse() {
            Ok(v) => Ok(TokenKind::Int(v)),
            // i64 に収まらない整数は実数として扱う
            Err(_) => text
                .parse()
                .map(TokenKind::Float)
                .map_err(|_| DmError::expression(format!("invalid number '{}'", text), start)),
        }
    }
}
