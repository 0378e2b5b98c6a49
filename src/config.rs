//! 解析与渲染共享的配置。

use crate::evaluator::{DefaultEvaluator, ExprEvaluator};
use crate::factory::{DefaultObjectFactory, ObjectFactory};
use crate::flavor::{Flavor, default_flavor};

/// 模板引擎配置：构建 [`crate::parser::TemplateParser`] 时传入，
/// 渲染期由 SQL 源共享。
#[derive(Debug, Clone)]
pub struct MapperConfig {
    /// 占位符方言。
    pub flavor: Flavor,
    /// 写路径遇到缺失中间段时的实例化策略。
    pub factory: Box<dyn ObjectFactory>,
    /// test/bind/foreach 表达式的求值器。
    pub evaluator: Box<dyn ExprEvaluator>,
}

impl Default for MapperConfig {
    fn default() -> Self {
        Self {
            flavor: default_flavor(),
            factory: Box::new(DefaultObjectFactory),
            evaluator: Box::new(DefaultEvaluator),
        }
    }
}

impl MapperConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_flavor(mut self, flavor: Flavor) -> Self {
        self.flavor = flavor;
        self
    }

    pub fn with_factory(mut self, factory: impl ObjectFactory + 'static) -> Self {
        self.factory = Box::new(factory);
        self
    }

    pub fn with_evaluator(mut self, evaluator: impl ExprEvaluator + 'static) -> Self {
        self.evaluator = Box::new(evaluator);
        self
    }
}
