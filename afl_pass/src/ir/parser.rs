//! Parser for the textual module form produced by the printer.
//!
//! The syntax is a small LLVM-like subset:
//!
//! ```text
//! ; module demo
//! @counter = global i32 0
//! @.str = private constant [4 x i8] c"abc\00"
//! declare i64 @fread(ptr, i64, i64, ptr)
//! define i32 @main(i32 %0) {
//! entry:
//!   %1 = add i32 %0, 1
//!   ret i32 %1
//! }
//! ```
//!
//! SSA values are numbered (`%0`, `%1`, ...); parameters take the first
//! numbers. Unnamed functions are written `@<index>`.

use std::collections::HashMap;

use anyhow::{Context, Result, anyhow, bail, ensure};

use crate::ir::instruction::{
    Arg, BinOp, BlockId, Callee, CastOp, CmpPred, FunctionId, GlobalId, InstKind, Instruction,
    Metadata, Operand, Terminator, ValueId,
};
use crate::ir::module::{Function, Global, GlobalInit, Linkage, Module};
use crate::ir::types::{FuncType, Type};

#[derive(Debug, Clone, PartialEq, Eq)]
enum Token {
    Global(String),
    Local(String),
    Word(String),
    Int(i64),
    Bytes(Vec<u8>),
    Meta(String),
    Punct(char),
    Ellipsis,
}

fn is_ident_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '$' | '-')
}

fn tokenize(line: &str) -> Result<Vec<Token>> {
    let chars: Vec<char> = line.chars().collect();
    let mut tokens = Vec::new();
    let mut i = 0;

    let ident = |start: usize| {
        let mut end = start;
        while end < chars.len() && is_ident_char(chars[end]) {
            end += 1;
        }
        (chars[start..end].iter().collect::<String>(), end)
    };

    while i < chars.len() {
        let c = chars[i];
        match c {
            ';' => break,
            c if c.is_whitespace() => i += 1,
            '@' | '%' | '!' => {
                let (name, end) = ident(i + 1);
                ensure!(!name.is_empty(), "expected a name after '{c}'");
                tokens.push(match c {
                    '@' => Token::Global(name),
                    '%' => Token::Local(name),
                    _ => Token::Meta(name),
                });
                i = end;
            }
            'c' if chars.get(i + 1) == Some(&'"') => {
                let mut bytes = Vec::new();
                i += 2;
                loop {
                    match chars.get(i) {
                        None => bail!("unterminated string literal"),
                        Some('"') => {
                            i += 1;
                            break;
                        }
                        Some('\\') => {
                            let hex: String =
                                chars.get(i + 1..i + 3).unwrap_or_default().iter().collect();
                            let byte = u8::from_str_radix(&hex, 16)
                                .map_err(|_| anyhow!("bad escape sequence '\\{hex}'"))?;
                            bytes.push(byte);
                            i += 3;
                        }
                        Some(ch) => {
                            let mut buf = [0; 4];
                            bytes.extend_from_slice(ch.encode_utf8(&mut buf).as_bytes());
                            i += 1;
                        }
                    }
                }
                tokens.push(Token::Bytes(bytes));
            }
            '.' if chars.get(i..i + 3) == Some(&['.', '.', '.'][..]) => {
                tokens.push(Token::Ellipsis);
                i += 3;
            }
            '-' | '0'..='9' => {
                let (text, end) = ident(i);
                let value = text
                    .parse::<i64>()
                    .map_err(|_| anyhow!("invalid integer literal '{text}'"))?;
                tokens.push(Token::Int(value));
                i = end;
            }
            '=' | ',' | '(' | ')' | '[' | ']' | '{' | '}' | ':' => {
                tokens.push(Token::Punct(c));
                i += 1;
            }
            c if is_ident_char(c) => {
                let (word, end) = ident(i);
                tokens.push(Token::Word(word));
                i = end;
            }
            other => bail!("unexpected character '{other}'"),
        }
    }
    Ok(tokens)
}

/// A token stream for one line.
struct Tokens {
    tokens: Vec<Token>,
    pos: usize,
}

impl Tokens {
    fn new(tokens: Vec<Token>) -> Self {
        Self { tokens, pos: 0 }
    }

    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn next(&mut self) -> Result<Token> {
        let token = self
            .tokens
            .get(self.pos)
            .cloned()
            .ok_or_else(|| anyhow!("unexpected end of line"))?;
        self.pos += 1;
        Ok(token)
    }

    fn eat_punct(&mut self, c: char) -> bool {
        if self.peek() == Some(&Token::Punct(c)) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn expect_punct(&mut self, c: char) -> Result<()> {
        match self.next()? {
            Token::Punct(found) if found == c => Ok(()),
            other => bail!("expected '{c}', found {other:?}"),
        }
    }

    fn eat_word(&mut self, word: &str) -> bool {
        if matches!(self.peek(), Some(Token::Word(w)) if w == word) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn expect_word(&mut self, word: &str) -> Result<()> {
        match self.next()? {
            Token::Word(found) if found == word => Ok(()),
            other => bail!("expected '{word}', found {other:?}"),
        }
    }

    fn word(&mut self) -> Result<String> {
        match self.next()? {
            Token::Word(word) => Ok(word),
            other => bail!("expected a keyword, found {other:?}"),
        }
    }

    fn int(&mut self) -> Result<i64> {
        match self.next()? {
            Token::Int(value) => Ok(value),
            other => bail!("expected an integer, found {other:?}"),
        }
    }

    fn ty(&mut self) -> Result<Type> {
        match self.next()? {
            Token::Word(word) => parse_scalar_type(&word),
            Token::Punct('[') => {
                let len = u64::try_from(self.int()?).context("negative array length")?;
                self.expect_word("x")?;
                let elem = self.ty()?;
                self.expect_punct(']')?;
                Ok(Type::Array {
                    len,
                    elem: Box::new(elem),
                })
            }
            other => bail!("expected a type, found {other:?}"),
        }
    }

    fn finish(&self) -> Result<()> {
        match self.peek() {
            None => Ok(()),
            Some(token) => bail!("unexpected trailing {token:?}"),
        }
    }
}

fn parse_scalar_type(word: &str) -> Result<Type> {
    match word {
        "void" => Ok(Type::Void),
        "ptr" => Ok(Type::Ptr),
        _ => match word.strip_prefix('i').map(str::parse::<u8>) {
            Some(Ok(bits @ (1 | 8 | 16 | 32 | 64))) => Ok(Type::Int(bits)),
            _ => bail!("unknown type '{word}'"),
        },
    }
}

fn value_number(name: &str) -> Result<ValueId> {
    name.parse::<u32>()
        .map(ValueId)
        .map_err(|_| anyhow!("value names must be numeric, found '%{name}'"))
}

struct Line {
    number: usize,
    text: String,
    tokens: Vec<Token>,
}

/// A function header seen during the first pass, with the lines of its body.
struct PendingBody {
    id: FunctionId,
    lines: Vec<Line>,
}

/// Module-level symbol table shared by all function bodies.
struct Symbols {
    functions: HashMap<String, FunctionId>,
    globals: HashMap<String, GlobalId>,
}

impl Symbols {
    fn operand(&self, name: &str) -> Result<Operand> {
        if let Some(id) = self.functions.get(name) {
            Ok(Operand::Function(*id))
        } else if let Some(id) = self.globals.get(name) {
            Ok(Operand::Global(*id))
        } else {
            bail!("unknown symbol '@{name}'")
        }
    }
}

/// Parses a module from its textual form.
pub fn parse_module(text: &str) -> Result<Module> {
    let mut module = Module::new("");
    let mut symbols = Symbols {
        functions: HashMap::new(),
        globals: HashMap::new(),
    };
    let mut bodies: Vec<PendingBody> = Vec::new();
    let mut open_body: Option<PendingBody> = None;

    for (index, raw) in text.lines().enumerate() {
        let number = index + 1;
        if let Some(name) = raw.trim().strip_prefix("; module ") {
            module.name = name.trim().to_string();
            continue;
        }
        let tokens = tokenize(raw).with_context(|| format!("line {number}: {raw}"))?;
        if tokens.is_empty() {
            continue;
        }

        if open_body.is_some() {
            if tokens == [Token::Punct('}')] {
                bodies.extend(open_body.take());
            } else if let Some(body) = open_body.as_mut() {
                body.lines.push(Line {
                    number,
                    text: raw.to_string(),
                    tokens,
                });
            }
            continue;
        }

        let mut line = Tokens::new(tokens);
        let header = || format!("line {number}: {raw}");
        match line.peek() {
            Some(Token::Global(_)) => {
                let global = parse_global(&mut line).with_context(header)?;
                ensure!(
                    !symbols.globals.contains_key(&global.name)
                        && !symbols.functions.contains_key(&global.name),
                    "{}: duplicate symbol '@{}'",
                    header(),
                    global.name
                );
                let name = global.name.clone();
                symbols.globals.insert(name, module.add_global(global));
            }
            Some(Token::Word(word)) if word == "declare" || word == "define" => {
                let index = FunctionId(module.functions.len() as u32);
                let (function, has_body) =
                    parse_function_header(&mut line, index).with_context(header)?;
                let symbol = module_symbol(&function, index);
                ensure!(
                    !symbols.functions.contains_key(&symbol)
                        && !symbols.globals.contains_key(&symbol),
                    "{}: duplicate symbol '@{symbol}'",
                    header()
                );
                let id = module.add_function(function);
                symbols.functions.insert(symbol, id);
                if has_body {
                    open_body = Some(PendingBody {
                        id,
                        lines: Vec::new(),
                    });
                }
            }
            _ => bail!("{}: expected a global or function", header()),
        }
    }

    if let Some(body) = open_body {
        bail!(
            "function @{} is missing its closing '}}'",
            module.function_symbol(body.id)
        );
    }

    for body in bodies {
        parse_body(&mut module, &symbols, body)?;
    }
    Ok(module)
}

fn module_symbol(function: &Function, index: FunctionId) -> String {
    match &function.name {
        Some(name) => name.clone(),
        None => index.0.to_string(),
    }
}

fn parse_global(line: &mut Tokens) -> Result<Global> {
    let Token::Global(name) = line.next()? else {
        bail!("expected a global name");
    };
    line.expect_punct('=')?;
    let linkage = if line.eat_word("external") {
        Linkage::External
    } else if line.eat_word("private") {
        Linkage::Private
    } else {
        Linkage::Default
    };
    let thread_local = line.eat_word("thread_local");
    let constant = match line.word()?.as_str() {
        "global" => false,
        "constant" => true,
        other => bail!("expected 'global' or 'constant', found '{other}'"),
    };
    let ty = line.ty()?;
    let init = match line.peek() {
        None => None,
        Some(Token::Int(_)) => Some(GlobalInit::Int(line.int()?)),
        Some(Token::Word(word)) if word == "null" => {
            line.next()?;
            Some(GlobalInit::Null)
        }
        Some(Token::Bytes(_)) => match line.next()? {
            Token::Bytes(bytes) => Some(GlobalInit::Bytes(bytes)),
            _ => unreachable!("peeked a byte string"),
        },
        Some(other) => bail!("unexpected initializer {other:?}"),
    };
    line.finish()?;
    ensure!(
        (linkage == Linkage::External) == init.is_none(),
        "external globals take no initializer and defined globals need one"
    );
    Ok(Global {
        name,
        ty,
        linkage,
        thread_local,
        constant,
        init,
    })
}

fn parse_function_header(line: &mut Tokens, index: FunctionId) -> Result<(Function, bool)> {
    let has_body = line.word()? == "define";
    let ret = line.ty()?;
    let name = match line.next()? {
        Token::Global(name) => name,
        other => bail!("expected a function name, found {other:?}"),
    };
    let name = match name.parse::<u32>() {
        Ok(n) if n == index.0 => None,
        Ok(n) => bail!("unnamed function @{n} must be function number {}", index.0),
        Err(_) => Some(name),
    };

    line.expect_punct('(')?;
    let mut params = Vec::new();
    let mut variadic = false;
    if !line.eat_punct(')') {
        loop {
            if line.peek() == Some(&Token::Ellipsis) {
                line.next()?;
                variadic = true;
                line.expect_punct(')')?;
                break;
            }
            params.push(line.ty()?);
            if has_body {
                let Token::Local(value) = line.next()? else {
                    bail!("expected a parameter value");
                };
                let expected = params.len() as u32 - 1;
                ensure!(
                    value_number(&value)?.0 == expected,
                    "parameter %{value} must be numbered %{expected}"
                );
            }
            if line.eat_punct(')') {
                break;
            }
            line.expect_punct(',')?;
        }
    }
    if has_body {
        line.expect_punct('{')?;
    }
    line.finish()?;

    let ty = FuncType {
        ret,
        params,
        variadic,
    };
    Ok((Function::new(name, ty), has_body))
}

fn parse_body(module: &mut Module, symbols: &Symbols, body: PendingBody) -> Result<()> {
    let function = module.function_mut(body.id);

    // Create every block up front so branches and phis may refer forward.
    for line in &body.lines {
        let label = match line.tokens.as_slice() {
            [Token::Word(label) | Token::Local(label), Token::Punct(':')] => label.clone(),
            [Token::Int(label), Token::Punct(':')] => label.to_string(),
            _ => continue,
        };
        ensure!(
            function.find_block(&label).is_none(),
            "line {}: duplicate block label '{label}'",
            line.number
        );
        function.add_block(label);
    }

    let mut current: Option<BlockId> = None;
    let mut terminated = false;
    for line in body.lines {
        let context = || format!("line {}: {}", line.number, line.text);
        let mut tokens = Tokens::new(line.tokens.clone());
        if matches!(
            line.tokens.as_slice(),
            [Token::Word(_) | Token::Local(_) | Token::Int(_), Token::Punct(':')]
        ) {
            if let Some(block) = current {
                ensure!(
                    terminated,
                    "block '{}' has no terminator",
                    function.block(block).label
                );
            }
            current = Some(BlockId(current.map_or(0, |block| block.0 + 1)));
            terminated = false;
            continue;
        }

        let block = current.ok_or_else(|| anyhow!("{}: instruction outside a block", context()))?;
        ensure!(!terminated, "{}: instruction after terminator", context());
        match parse_line(&mut tokens, function, symbols).with_context(context)? {
            Parsed::Instruction(inst) => {
                if let Some(result) = inst.result {
                    function.reserve_value(result).with_context(context)?;
                }
                function.block_mut(block).instructions.push(inst);
            }
            Parsed::Terminator(terminator) => {
                function.block_mut(block).terminator = terminator;
                terminated = true;
            }
        }
    }

    match current {
        None => bail!("function body has no blocks"),
        Some(block) if !terminated => bail!(
            "block '{}' has no terminator",
            function.block(block).label
        ),
        Some(_) => Ok(()),
    }
}

enum Parsed {
    Instruction(Instruction),
    Terminator(Terminator),
}

fn parse_operand(line: &mut Tokens, symbols: &Symbols) -> Result<Operand> {
    match line.next()? {
        Token::Local(name) => Ok(Operand::Value(value_number(&name)?)),
        Token::Int(value) => Ok(Operand::Const(value)),
        Token::Word(word) if word == "null" => Ok(Operand::Null),
        Token::Global(name) => symbols.operand(&name),
        other => bail!("expected an operand, found {other:?}"),
    }
}

fn parse_label(line: &mut Tokens, function: &Function) -> Result<BlockId> {
    line.expect_word("label")?;
    parse_label_ref(line, function)
}

fn parse_label_ref(line: &mut Tokens, function: &Function) -> Result<BlockId> {
    match line.next()? {
        Token::Local(label) => function
            .find_block(&label)
            .ok_or_else(|| anyhow!("unknown block '%{label}'")),
        other => bail!("expected a block label, found {other:?}"),
    }
}

fn parse_line(line: &mut Tokens, function: &Function, symbols: &Symbols) -> Result<Parsed> {
    let result = match line.tokens.get(1) {
        Some(Token::Punct('=')) => match line.next()? {
            Token::Local(name) => {
                line.next()?;
                Some(value_number(&name)?)
            }
            other => bail!("expected a result value, found {other:?}"),
        },
        _ => None,
    };

    let opcode = line.word()?;
    let kind = match opcode.as_str() {
        "ret" | "br" | "unreachable" => {
            ensure!(result.is_none(), "terminators produce no value");
            let terminator = if opcode == "unreachable" {
                Terminator::Unreachable
            } else if opcode == "ret" {
                if line.eat_word("void") {
                    Terminator::Ret(None)
                } else {
                    let ty = line.ty()?;
                    Terminator::Ret(Some((ty, parse_operand(line, symbols)?)))
                }
            } else if line.eat_word("label") {
                Terminator::Br(parse_label_ref(line, function)?)
            } else {
                line.expect_word("i1")?;
                let cond = parse_operand(line, symbols)?;
                line.expect_punct(',')?;
                let then_block = parse_label(line, function)?;
                line.expect_punct(',')?;
                let else_block = parse_label(line, function)?;
                Terminator::CondBr {
                    cond,
                    then_block,
                    else_block,
                }
            };
            line.finish()?;
            return Ok(Parsed::Terminator(terminator));
        }
        "load" => {
            let ty = line.ty()?;
            line.expect_punct(',')?;
            line.expect_word("ptr")?;
            InstKind::Load {
                ty,
                ptr: parse_operand(line, symbols)?,
            }
        }
        "store" => {
            let ty = line.ty()?;
            let value = parse_operand(line, symbols)?;
            line.expect_punct(',')?;
            line.expect_word("ptr")?;
            InstKind::Store {
                ty,
                value,
                ptr: parse_operand(line, symbols)?,
            }
        }
        "icmp" => {
            let pred = line.word()?;
            let pred = CmpPred::ALL
                .into_iter()
                .find(|p| p.mnemonic() == pred)
                .ok_or_else(|| anyhow!("unknown comparison '{pred}'"))?;
            let ty = line.ty()?;
            let lhs = parse_operand(line, symbols)?;
            line.expect_punct(',')?;
            InstKind::Icmp {
                pred,
                ty,
                lhs,
                rhs: parse_operand(line, symbols)?,
            }
        }
        "zext" | "trunc" => {
            let op = if opcode == "zext" {
                CastOp::ZExt
            } else {
                CastOp::Trunc
            };
            let from = line.ty()?;
            let value = parse_operand(line, symbols)?;
            line.expect_word("to")?;
            InstKind::Cast {
                op,
                from,
                value,
                to: line.ty()?,
            }
        }
        "getelementptr" => {
            line.expect_word("i8")?;
            line.expect_punct(',')?;
            line.expect_word("ptr")?;
            let base = parse_operand(line, symbols)?;
            line.expect_punct(',')?;
            let index_ty = line.ty()?;
            InstKind::Gep {
                base,
                index_ty,
                index: parse_operand(line, symbols)?,
            }
        }
        "call" => {
            let ret = line.ty()?;
            let callee = match parse_operand(line, symbols)? {
                Operand::Function(id) => Callee::Direct(id),
                other => Callee::Indirect(other),
            };
            line.expect_punct('(')?;
            let mut args = Vec::new();
            if !line.eat_punct(')') {
                loop {
                    let ty = line.ty()?;
                    args.push(Arg::new(ty, parse_operand(line, symbols)?));
                    if line.eat_punct(')') {
                        break;
                    }
                    line.expect_punct(',')?;
                }
            }
            InstKind::Call { ret, callee, args }
        }
        "phi" => {
            let ty = line.ty()?;
            let mut incoming = Vec::new();
            loop {
                line.expect_punct('[')?;
                let value = parse_operand(line, symbols)?;
                line.expect_punct(',')?;
                let block = parse_label_ref(line, function)?;
                line.expect_punct(']')?;
                incoming.push((value, block));
                if !matches!(line.tokens.get(line.pos + 1), Some(Token::Punct('['))) {
                    break;
                }
                line.expect_punct(',')?;
            }
            InstKind::Phi { ty, incoming }
        }
        mnemonic => {
            let op = BinOp::ALL
                .into_iter()
                .find(|op| op.mnemonic() == mnemonic)
                .ok_or_else(|| anyhow!("unknown instruction '{mnemonic}'"))?;
            let ty = line.ty()?;
            let lhs = parse_operand(line, symbols)?;
            line.expect_punct(',')?;
            InstKind::Binary {
                op,
                ty,
                lhs,
                rhs: parse_operand(line, symbols)?,
            }
        }
    };

    let mut metadata = Metadata::default();
    while line.eat_punct(',') {
        match line.next()? {
            Token::Meta(name) if name == "nosanitize" => metadata.nosanitize = true,
            other => bail!("unknown metadata {other:?}"),
        }
    }
    line.finish()?;

    let produces_value = !kind.result_type().is_void();
    match (result.is_some(), produces_value) {
        (true, false) => bail!("'{opcode}' produces no value to name"),
        (false, true) if !kind.is_call() => bail!("the result of '{opcode}' must be named"),
        _ => {}
    }
    Ok(Parsed::Instruction(Instruction {
        result,
        kind,
        metadata,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    const SAMPLE: &str = r#"; module sample

@counter = global i32 0
@__afl_prev_loc = external thread_local global i32
@.str = private constant [6 x i8] c"fread\00"

declare i64 @fread(ptr, i64, i64, ptr)

declare i32 @printf(ptr, ...)

define i32 @main(i32 %0, ptr %1) {
entry:
  %2 = call i64 @fread(ptr %1, i64 1, i64 16, ptr null)
  %3 = trunc i64 %2 to i32
  %4 = icmp eq i32 %3, 0
  br i1 %4, label %done, label %loop

loop:
  %5 = phi i32 [ %3, %entry ], [ %6, %loop ]
  %6 = sub i32 %5, 1
  %7 = load i32, ptr @counter, !nosanitize
  store i32 %6, ptr @counter
  call i32 @printf(ptr @.str, i32 %7)
  %8 = icmp ne i32 %6, 0
  br i1 %8, label %loop, label %done

done:
  ret i32 0
}
"#;

    #[test]
    fn tokenizes_symbols_and_literals() {
        let tokens = tokenize(r#"@.str = private constant [2 x i8] c"a\00" ; trailing"#).unwrap();
        assert_eq!(tokens[0], Token::Global(".str".to_string()));
        assert_eq!(tokens.last(), Some(&Token::Bytes(vec![b'a', 0])));
        assert_eq!(
            tokenize("declare i32 @printf(ptr, ...)").unwrap()[6],
            Token::Ellipsis
        );
    }

    #[test]
    fn parses_globals_and_functions() {
        let module = parse_module(SAMPLE).unwrap();
        assert_eq!(module.name, "sample");
        assert_eq!(module.globals.len(), 3);
        assert!(module.globals[1].thread_local);
        assert_eq!(module.functions.len(), 3);
        assert!(module.functions[1].ty.variadic);

        let main = &module.functions[2];
        assert_eq!(main.blocks.len(), 3);
        assert_eq!(main.block(BlockId(1)).first_insertion_point(), 1);
        assert!(main.block(BlockId(1)).instructions[2].metadata.nosanitize);
        assert_matches!(
            &main.block(BlockId(0)).instructions[0].kind,
            InstKind::Call { callee: Callee::Direct(FunctionId(0)), args, .. } if args.len() == 4
        );
        assert_matches!(
            main.block(BlockId(0)).terminator,
            Terminator::CondBr {
                then_block: BlockId(2),
                else_block: BlockId(1),
                ..
            }
        );
    }

    #[test]
    fn printing_reproduces_the_input() {
        let module = parse_module(SAMPLE).unwrap();
        assert_eq!(module.to_string(), SAMPLE);
    }

    #[test]
    fn fresh_values_follow_the_highest_number() {
        let mut module = parse_module(SAMPLE).unwrap();
        assert_eq!(
            module.function_mut(FunctionId(2)).fresh_value().unwrap(),
            ValueId(9)
        );
    }

    #[test]
    fn unnamed_functions_are_addressed_by_index() {
        let text =
            "declare void @0()\n\ndefine void @run() {\nentry:\n  call void @0()\n  ret void\n}\n";
        let module = parse_module(text).unwrap();
        assert!(!module.functions[0].has_name());
        assert_eq!(module.function_symbol(FunctionId(0)), "0");
        assert!(parse_module("declare void @3()\n").is_err());
    }

    #[test]
    fn reports_line_numbers() {
        let err = parse_module("define void @f() {\nentry:\n  %1 = frob i32 1, 2\n  ret void\n}\n")
            .unwrap_err();
        assert!(format!("{err:#}").contains("line 3"));
        assert!(format!("{err:#}").contains("unknown instruction 'frob'"));
    }

    #[test]
    fn rejects_malformed_modules() {
        assert!(parse_module("define void @f() {\nentry:\n  ret void\n").is_err());
        assert!(parse_module("define void @f() {\nentry:\n  store i32 1, ptr null\n}\n").is_err());
        assert!(
            parse_module("define void @f() {\nentry:\n  call void @g()\n  ret void\n}\n").is_err()
        );
        assert!(parse_module("@g = external global i32 0\n").is_err());
        assert!(parse_module("declare void @f()\ndeclare void @f()\n").is_err());
    }

    #[test]
    fn rejects_duplicate_numeric_labels() {
        let text = "define void @f() {\n1:\n  br label %1\n\n1:\n  ret void\n}\n";
        let err = parse_module(text).unwrap_err();
        assert!(format!("{err:#}").contains("duplicate block label '1'"));
    }

    #[test]
    fn rejects_the_last_value_number() {
        let text = "define i32 @f(i32 %0) {\nentry:\n  %4294967295 = add i32 %0, 1\n  \
                    ret i32 %0\n}\n";
        let err = parse_module(text).unwrap_err();
        assert!(format!("{err:#}").contains("line 3"));
        assert!(format!("{err:#}").contains("out of range"));
    }
}
