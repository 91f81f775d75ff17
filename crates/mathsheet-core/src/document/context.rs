//! Evaluation context: variables, stacks, sections and history of one worksheet.

use mathsheet_engine::engine::{
    AST, Array, CURRENT_STACK_VAR, Callable, Dynamic, LAST_ANSWER_VAR, RenderOptions, Scope, Value,
    apply_format, constants, extend_library, render,
};

use crate::error::{Result, WorksheetError};

/// Spellings of the last-answer pseudo-variable.
pub const ANSWER_NAMES: [&str; 3] = [LAST_ANSWER_VAR, "Ans", "ANS"];

/// One computed value.
#[derive(Clone, Debug, PartialEq)]
pub struct ResultItem {
    pub name: Option<String>,
    pub value: Value,
    pub remark: String,
    /// Display template such as `{:.2f}`; empty when unset.
    pub format: String,
    pub stack: String,
    pub section: String,
}

impl ResultItem {
    pub fn formatted_value(&self, options: &RenderOptions) -> Result<String> {
        format_value(&self.value, &self.format, options)
    }
}

/// Render `value` through `format` when one is set.
pub fn format_value(value: &Value, format: &str, options: &RenderOptions) -> Result<String> {
    if format.is_empty() {
        Ok(render(value, options))
    } else {
        apply_format(format, value, options).map_err(WorksheetError::Evaluation)
    }
}

/// A named, ordered bucket of results (a stack or a section).
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Bucket {
    pub name: String,
    pub remark: String,
    /// Default display template for items stored into the bucket.
    pub format: String,
    /// Indices into the context history.
    items: Vec<usize>,
}

impl Bucket {
    fn new(name: &str, remark: &str, format: &str) -> Self {
        Bucket {
            name: name.trim().to_string(),
            remark: remark.trim().to_string(),
            format: format.trim().to_string(),
            items: Vec::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

/// Re-enter the bucket called `name`, or start a new one. The entered bucket
/// becomes the last (current) one.
fn enter(buckets: &mut Vec<Bucket>, name: &str, remark: &str, format: &str) {
    let name = name.trim();
    match buckets.iter().position(|b| b.name == name) {
        Some(pos) => {
            let mut bucket = buckets.remove(pos);
            if !remark.trim().is_empty() {
                bucket.remark = remark.trim().to_string();
            }
            if !format.trim().is_empty() {
                bucket.format = format.trim().to_string();
            }
            buckets.push(bucket);
        }
        None => buckets.push(Bucket::new(name, remark, format)),
    }
}

/// Mutable state shared by the lines of one recalculation pass.
#[derive(Clone, Debug, Default)]
pub struct EvaluationContext {
    /// Latest binding per name, in last-write order.
    variables: Vec<ResultItem>,
    history: Vec<ResultItem>,
    stacks: Vec<Bucket>,
    sections: Vec<Bucket>,
    /// Compiled bodies of the worksheet functions defined so far.
    library: Option<AST>,
}

impl EvaluationContext {
    pub fn new() -> Self {
        let mut ctx = EvaluationContext::default();
        ctx.clear();
        ctx
    }

    /// Forget everything and seed a fresh anonymous stack.
    pub fn clear(&mut self) {
        self.variables.clear();
        self.history.clear();
        self.stacks.clear();
        self.sections.clear();
        self.library = None;
        self.stacks.push(Bucket::new("", "Anonymous stack", ""));
    }

    pub fn start_stack(&mut self, name: &str, remark: &str, format: &str) {
        enter(&mut self.stacks, name, remark, format);
    }

    pub fn start_section(&mut self, name: &str) {
        enter(&mut self.sections, name, "", "");
    }

    pub fn current_stack(&self) -> Option<&Bucket> {
        self.stacks.last()
    }

    pub fn current_section(&self) -> Option<&Bucket> {
        self.sections.last()
    }

    /// Explicit format wins, else the current stack's default.
    pub fn resolve_format(&self, explicit: &str) -> String {
        let explicit = explicit.trim();
        if !explicit.is_empty() {
            return explicit.to_string();
        }
        self.current_stack()
            .map(|s| s.format.clone())
            .unwrap_or_default()
    }

    /// Record a result. Functions are bound by name but never enter the
    /// history, stacks or sections.
    pub fn store(
        &mut self,
        name: Option<&str>,
        value: Value,
        remark: &str,
        format: &str,
        push_to_history: bool,
    ) -> ResultItem {
        let item = ResultItem {
            name: name.map(|n| n.trim().to_string()),
            remark: remark.trim().to_string(),
            format: self.resolve_format(format),
            stack: self.current_stack().map(|b| b.name.clone()).unwrap_or_default(),
            section: self.current_section().map(|b| b.name.clone()).unwrap_or_default(),
            value,
        };

        if let Some(name) = &item.name {
            self.variables.retain(|v| v.name.as_ref() != Some(name));
            self.variables.push(item.clone());
        }

        if push_to_history && !item.value.is_callable() {
            let index = self.history.len();
            self.history.push(item.clone());
            if let Some(stack) = self.stacks.last_mut() {
                stack.items.push(index);
            }
            if let Some(section) = self.sections.last_mut() {
                section.items.push(index);
            }
        }
        item
    }

    pub fn variable(&self, name: &str) -> Option<&ResultItem> {
        self.variables.iter().find(|v| v.name.as_deref() == Some(name))
    }

    /// Variables in last-write order.
    pub fn variables(&self) -> impl Iterator<Item = &ResultItem> {
        self.variables.iter()
    }

    pub fn history(&self) -> &[ResultItem] {
        &self.history
    }

    /// Named stacks, oldest first. The anonymous stack is not included.
    pub fn stacks(&self) -> impl Iterator<Item = &Bucket> {
        self.stacks.iter().filter(|b| !b.name.is_empty())
    }

    pub fn has_stack(&self, name: &str) -> bool {
        !name.is_empty() && self.stacks.iter().any(|b| b.name == name)
    }

    /// Items stored into the named stack.
    pub fn stack_items(&self, name: &str) -> Vec<&ResultItem> {
        self.bucket_items(self.stacks.iter().find(|b| b.name == name))
    }

    #[cfg(test)]
    pub fn section_items(&self, name: &str) -> Vec<&ResultItem> {
        self.bucket_items(self.sections.iter().find(|b| b.name == name))
    }

    fn bucket_items(&self, bucket: Option<&Bucket>) -> Vec<&ResultItem> {
        bucket
            .map(|b| b.items.iter().filter_map(|&i| self.history.get(i)).collect())
            .unwrap_or_default()
    }

    pub fn current_stack_values(&self) -> Vec<Value> {
        self.current_stack()
            .map(|b| {
                b.items
                    .iter()
                    .filter_map(|&i| self.history.get(i))
                    .map(|item| item.value.clone())
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Value of the last history entry, `0` when there is none.
    pub fn last_answer(&self) -> Value {
        self.history
            .last()
            .map(|item| item.value.clone())
            .unwrap_or(Value::Int(0))
    }

    /// The worksheet function bound to `name`, unless a stack shadows it.
    pub fn function(&self, name: &str) -> Option<&Callable> {
        if self.has_stack(name) || ANSWER_NAMES.contains(&name) {
            return None;
        }
        match self.variable(name).map(|v| &v.value) {
            Some(Value::Function(callable)) => Some(callable),
            _ => None,
        }
    }

    pub fn is_function(&self, name: &str) -> bool {
        self.function(name).is_some()
    }

    pub fn library(&self) -> Option<&AST> {
        self.library.as_ref()
    }

    pub fn extend_library(&mut self, ast: &AST) {
        extend_library(&mut self.library, ast);
    }

    /// Names visible to an expression. Later pushes shadow earlier ones:
    /// constants < variables < stacks < last answer < current stack.
    pub fn build_namespace(&self) -> Scope<'static> {
        let mut scope = Scope::new();
        for (name, value) in constants() {
            scope.push_dynamic(name, value);
        }
        for item in &self.variables {
            if let Some(name) = &item.name {
                scope.push_dynamic(name.clone(), item.value.clone().into_dynamic());
            }
        }
        for stack in self.stacks() {
            let values: Array = self
                .stack_items(&stack.name)
                .into_iter()
                .map(|item| item.value.clone().into_dynamic())
                .collect();
            scope.push_dynamic(stack.name.clone(), Dynamic::from_array(values));
        }
        let answer = self.last_answer().into_dynamic();
        for name in ANSWER_NAMES {
            scope.push_dynamic(name, answer.clone());
        }
        let current: Array = self
            .current_stack_values()
            .into_iter()
            .map(Value::into_dynamic)
            .collect();
        scope.push_dynamic(CURRENT_STACK_VAR, Dynamic::from_array(current));
        scope
    }
}
