//! 训练指标记录, 每个属性只汇总上次 summarize 之后的新数据

use std::collections::HashMap;

use crate::error::{Error, Result};

#[derive(Debug, Clone, Copy)]
pub enum Summary {
    Mean,
    Std, // 总体标准差
    Min,
    Max,
    Sum,
    Count,
    Last,
    Custom {
        name: &'static str,
        func: fn(&[f64]) -> f64,
    },
}

impl Summary {
    pub fn name(&self) -> &'static str {
        match self {
            Summary::Mean => "mean",
            Summary::Std => "std",
            Summary::Min => "min",
            Summary::Max => "max",
            Summary::Sum => "sum",
            Summary::Count => "count",
            Summary::Last => "last",
            Summary::Custom { name, .. } => *name,
        }
    }

    /// `Sum` and `Count` of an empty window are 0; the rest are NaN.
    pub fn apply(&self, values: &[f64]) -> f64 {
        match self {
            Summary::Sum => values.iter().sum(),
            Summary::Count => values.len() as f64,
            Summary::Custom { func, .. } => func(values),
            _ if values.is_empty() => f64::NAN,
            Summary::Mean => mean(values),
            Summary::Std => {
                let m = mean(values);
                let var = values.iter().map(|v| (v - m).powi(2)).sum::<f64>() / values.len() as f64;
                var.sqrt()
            }
            Summary::Min => values.iter().cloned().fold(f64::INFINITY, f64::min),
            Summary::Max => values.iter().cloned().fold(f64::NEG_INFINITY, f64::max),
            Summary::Last => values[values.len() - 1],
        }
    }
}

fn mean(values: &[f64]) -> f64 {
    values.iter().sum::<f64>() / values.len() as f64
}

struct Attribute {
    name: String,
    values: Vec<f64>,
    summary_ptr: usize,
    summaries: Vec<Summary>,
}

#[derive(Default)]
pub struct Logger {
    attributes: Vec<Attribute>,
    index: HashMap<String, usize>,
}

impl Logger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reset(&mut self) {
        self.attributes.clear();
        self.index.clear();
    }

    pub fn add_attribute(&mut self, name: &str, summaries: &[Summary]) -> Result<()> {
        if self.index.contains_key(name) {
            return Err(Error::DuplicateAttribute(name.to_string()));
        }
        self.index.insert(name.to_string(), self.attributes.len());
        self.attributes.push(Attribute {
            name: name.to_string(),
            values: Vec::new(),
            summary_ptr: 0,
            summaries: summaries.to_vec(),
        });
        Ok(())
    }

    pub fn has_attribute(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    pub fn put(&mut self, name: &str, value: f64) -> Result<()> {
        let i = self.position(name)?;
        self.attributes[i].values.push(value);
        Ok(())
    }

    pub fn values(&self, name: &str) -> Result<&[f64]> {
        let i = self.position(name)?;
        Ok(&self.attributes[i].values)
    }

    /// `None` 或空切片汇总全部属性 (按添加顺序)
    pub fn summarize(
        &mut self,
        attributes: Option<&[&str]>,
        from_beginning: bool,
    ) -> Result<Vec<(String, f64)>> {
        let order: Vec<usize> = match attributes {
            Some(names) if !names.is_empty() => names
                .iter()
                .map(|name| self.position(name))
                .collect::<Result<_>>()?,
            _ => (0..self.attributes.len()).collect(),
        };

        let mut summary = Vec::new();
        for i in order {
            let attr = &mut self.attributes[i];
            let ptr = if from_beginning {
                0
            } else {
                let ptr = attr.summary_ptr;
                attr.summary_ptr = attr.values.len();
                ptr
            };

            let window = &attr.values[ptr..];
            for f in &attr.summaries {
                summary.push((format!("{}_{}", attr.name, f.name()), f.apply(window)));
            }
        }
        Ok(summary)
    }

    // key=value; key=value
    pub fn summarize_fmt(
        &mut self,
        attributes: Option<&[&str]>,
        from_beginning: bool,
    ) -> Result<String> {
        Ok(self
            .summarize(attributes, from_beginning)?
            .iter()
            .map(|(key, value)| format!("{key}={value:.4}"))
            .collect::<Vec<_>>()
            .join("; "))
    }

    fn position(&self, name: &str) -> Result<usize> {
        self.index
            .get(name)
            .copied()
            .ok_or_else(|| Error::UnknownAttribute(name.to_string()))
    }
}
