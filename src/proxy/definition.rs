use crate::callsite::FunctionSignature;
use crate::error::{InvokerError, Result};
use crate::types::LogicalType;

/// A declared native method: symbol name plus logical signature
#[derive(Debug, Clone, PartialEq)]
pub struct MethodDefinition {
    pub name: String,
    pub signature: FunctionSignature,
}

impl MethodDefinition {
    pub fn new(name: impl Into<String>, signature: FunctionSignature) -> Self {
        Self {
            name: name.into(),
            signature,
        }
    }

    /// Parse from a C-style declaration
    /// Format: "return_type function_name(param1_type, param2_type, ...)"
    ///
    /// A trailing `...` makes the method variadic over any argument type.
    pub fn parse(declaration: &str) -> Option<Self> {
        let declaration = declaration.trim().trim_end_matches(';');

        let paren_pos = declaration.find('(')?;
        let before_paren = declaration[..paren_pos].trim();
        let after_paren = declaration[paren_pos + 1..].trim_end().strip_suffix(')')?.trim();

        // Split return type and name
        let (return_str, name) = before_paren.rsplit_once(char::is_whitespace)?;
        let name = name.trim_start_matches('*');
        if name.is_empty() {
            return None;
        }
        let return_str = return_str.trim();
        let ret = if return_str == "void" {
            None
        } else {
            Some(LogicalType::from_name(return_str)?)
        };

        let mut params = Vec::new();
        let mut variadic = false;
        for param in after_paren.split(',') {
            let param = param.trim();
            if param.is_empty() || param == "void" {
                continue;
            }
            if param == "..." {
                variadic = true;
                continue;
            }
            if variadic {
                // Nothing may follow the ellipsis
                return None;
            }
            params.push(param_type(param)?);
        }

        let signature = if variadic {
            FunctionSignature::variadic(params, LogicalType::Any, ret)
        } else {
            FunctionSignature::new(params, ret)
        };
        Some(Self::new(name, signature))
    }
}

/// Type of one parameter, with or without a trailing parameter name
fn param_type(param: &str) -> Option<LogicalType> {
    LogicalType::from_name(param).or_else(|| {
        let (type_str, _name) = param.rsplit_once(char::is_whitespace)?;
        LogicalType::from_name(type_str)
    })
}

/// A named set of native methods bound to one library
#[derive(Debug, Clone, PartialEq)]
pub struct InterfaceDefinition {
    name: String,
    library: String,
    methods: Vec<MethodDefinition>,
}

impl InterfaceDefinition {
    pub fn new(name: impl Into<String>, library: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            library: library.into(),
            methods: Vec::new(),
        }
    }

    /// Add a method; several methods may share a name (overloads)
    pub fn method(mut self, name: impl Into<String>, signature: FunctionSignature) -> Self {
        self.methods.push(MethodDefinition::new(name, signature));
        self
    }

    /// Add a method from a C-style declaration
    pub fn declare(mut self, declaration: &str) -> Result<Self> {
        let method = MethodDefinition::parse(declaration).ok_or_else(|| {
            InvokerError::unsupported(declaration, "unparseable method declaration")
        })?;
        self.methods.push(method);
        Ok(self)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn library(&self) -> &str {
        &self.library
    }

    pub fn methods(&self) -> &[MethodDefinition] {
        &self.methods
    }
}
