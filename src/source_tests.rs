#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use crate::binding::SyntaxError;
    use crate::config::MapperConfig;
    use crate::evaluator::EvalError;
    use crate::flavor::Flavor;
    use crate::meta::StructModel;
    use crate::navigator::PathError;
    use crate::parser::{BuildError, TemplateParser};
    use crate::value::Value;

    #[derive(Debug, Clone, Default, PartialEq)]
    struct Line {
        sku: String,
        qty: i64,
    }

    crate::param_struct! {
        impl Line {
            sku: { ty: "String" },
            qty: { ty: "i64" },
        }
    }

    #[derive(Debug, Clone, Default, PartialEq)]
    struct Order {
        id: i64,
        lines: Vec<Line>,
    }

    crate::param_struct! {
        impl Order {
            id:    { ty: "i64" },
            lines: { ty: "Vec<Line>", elem: "Line", nested: Line },
        }
    }

    fn parser() -> TemplateParser {
        // 测试之间可能临时改全局默认方言，这里显式固定
        TemplateParser::with_config(MapperConfig::new().with_flavor(Flavor::MySQL))
    }

    fn map(pairs: &[(&str, Value)]) -> Value {
        pairs.iter().cloned().collect()
    }

    #[test]
    fn where_guard_renders_or_vanishes() {
        let source = parser()
            .parse("<where><if test=\"name != null\">AND name = #{name}</if></where>")
            .unwrap();

        let param = map(&[("name", Value::from("Ann"))]);
        let bound = source.bound_sql(&param).unwrap();
        assert_eq!(bound.sql, "WHERE name = ?");
        assert_eq!(bound.bindings.len(), 1);
        assert_eq!(bound.bindings[0].property, "name");
        assert_eq!(bound.bind_values(&param).unwrap(), vec![Value::from("Ann")]);

        let param = map(&[("name", Value::Null)]);
        let bound = source.bound_sql(&param).unwrap();
        assert_eq!(bound.sql, "");
        assert!(bound.bindings.is_empty());
        assert_eq!(bound.bind_values(&param).unwrap(), Vec::<Value>::new());

        // 守卫前的静态文本与 WHERE 之间的衔接
        let source = parser()
            .parse(
                "select * from users \
                 <where><if test=\"name != null\">AND name = #{name}</if></where>",
            )
            .unwrap();
        let param = map(&[("name", Value::from("Ann"))]);
        assert_eq!(
            source.bound_sql(&param).unwrap().sql,
            "select * from users WHERE name = ?",
        );
        let param = map(&[("name", Value::Null)]);
        assert_eq!(source.bound_sql(&param).unwrap().sql, "select * from users");
    }

    #[test]
    fn foreach_expands_tightly_packed_placeholders() {
        let source = parser()
            .parse(
                "select * from t where id in \
                 <foreach collection=\"ids\" item=\"id\" open=\"(\" close=\")\" \
                 separator=\",\">#{id}</foreach>",
            )
            .unwrap();

        let param = map(&[("ids", Value::from(vec![1_i64, 2, 3]))]);
        let bound = source.bound_sql(&param).unwrap();
        assert_eq!(bound.sql, "select * from t where id in (?,?,?)");
        let properties: Vec<&str> =
            bound.bindings.iter().map(|b| b.property.as_str()).collect();
        assert_eq!(properties, vec!["__frch_id_0", "__frch_id_1", "__frch_id_2"]);
        assert_eq!(
            bound.bind_values(&param).unwrap(),
            vec![Value::I64(1), Value::I64(2), Value::I64(3)],
        );

        let empty = map(&[("ids", Value::Array(vec![]))]);
        let bound = source.bound_sql(&empty).unwrap();
        assert_eq!(bound.sql, "select * from t where id in");
        assert!(bound.bindings.is_empty());
    }

    #[test]
    fn foreach_binds_navigate_iteration_snapshots() {
        let source = parser()
            .parse(
                "<foreach collection=\"lines\" item=\"line\" separator=\",\">\
                 #{line.sku}</foreach>",
            )
            .unwrap();
        let param = Order {
            id: 1,
            lines: vec![
                Line { sku: "X".to_string(), qty: 2 },
                Line { sku: "Y".to_string(), qty: 1 },
            ],
        }
        .to_value();

        let bound = source.bound_sql(&param).unwrap();
        assert_eq!(bound.sql, "?,?");
        assert_eq!(bound.bindings[0].property, "__frch_line_0.sku");
        assert_eq!(
            bound.bind_values(&param).unwrap(),
            vec![Value::from("X"), Value::from("Y")],
        );
    }

    #[test]
    fn repeated_renders_are_identical() {
        let source = parser()
            .parse(
                "select * from t where id in <foreach collection=\"ids\" item=\"id\" \
                 open=\"(\" close=\")\" separator=\",\">#{id}</foreach>",
            )
            .unwrap();
        let param = map(&[("ids", Value::from(vec![7_i64, 8]))]);
        // 合成序号每次渲染从零起，重复渲染逐字节一致
        assert_eq!(source.bound_sql(&param).unwrap(), source.bound_sql(&param).unwrap());

        let source = parser().parse("select * from users where id = #{id}").unwrap();
        let a = source.bound_sql(&param).unwrap();
        let b = source.bound_sql(&param).unwrap();
        assert_eq!(a, b);
        assert_eq!(a.sql, "select * from users where id = ?");
    }

    #[test]
    fn flavored_placeholders_number_globally() {
        let config = MapperConfig::new().with_flavor(Flavor::PostgreSQL);
        let source = TemplateParser::with_config(config)
            .parse(
                "update t set a = #{a} where id in <foreach collection=\"ids\" \
                 item=\"id\" open=\"(\" close=\")\" separator=\",\">#{id}</foreach>",
            )
            .unwrap();
        let param = map(&[("a", Value::from("x")), ("ids", Value::from(vec![1_i64, 2]))]);
        let bound = source.bound_sql(&param).unwrap();
        assert_eq!(bound.sql, "update t set a = $1 where id in ($2,$3)");
        assert_eq!(
            bound.bind_values(&param).unwrap(),
            vec![Value::from("x"), Value::I64(1), Value::I64(2)],
        );
    }

    #[test]
    fn choose_renders_first_branch_or_otherwise() {
        let source = parser()
            .parse(
                "select * from t <where><choose>\
                 <when test=\"id != null\">id = #{id}</when>\
                 <otherwise>1 = 1</otherwise>\
                 </choose></where>",
            )
            .unwrap();

        let param = map(&[("id", Value::from(5))]);
        let bound = source.bound_sql(&param).unwrap();
        assert_eq!(bound.sql, "select * from t WHERE id = ?");
        assert_eq!(bound.bind_values(&param).unwrap(), vec![Value::I64(5)]);

        let param = map(&[]);
        let bound = source.bound_sql(&param).unwrap();
        assert_eq!(bound.sql, "select * from t WHERE 1 = 1");
        assert!(bound.bindings.is_empty());
    }

    #[test]
    fn set_drops_dangling_commas_between_guards() {
        let source = parser()
            .parse(
                "update users <set>\
                 <if test=\"name != null\">name = #{name},</if>\
                 <if test=\"vip != null\">vip = #{vip},</if>\
                 </set> where id = #{id}",
            )
            .unwrap();
        let param = map(&[
            ("name", Value::from("Ann")),
            ("vip", Value::Null),
            ("id", Value::from(7)),
        ]);
        let bound = source.bound_sql(&param).unwrap();
        assert_eq!(bound.sql, "update users SET name = ? where id = ?");
        assert_eq!(
            bound.bind_values(&param).unwrap(),
            vec![Value::from("Ann"), Value::I64(7)],
        );
    }

    #[test]
    fn bind_variables_feed_later_placeholders() {
        let source = parser()
            .parse("<bind name=\"alias\" value=\"name\"/>where name = #{alias}")
            .unwrap();
        let param = map(&[("name", Value::from("Ann"))]);
        let bound = source.bound_sql(&param).unwrap();
        assert_eq!(bound.sql, "where name = ?");
        assert_eq!(bound.extras.get("alias"), Some(&Value::from("Ann")));
        assert_eq!(bound.bind_values(&param).unwrap(), vec![Value::from("Ann")]);
    }

    #[test]
    fn inline_substitution_pastes_text() {
        let source = parser().parse("select * from t order by ${col}").unwrap();
        let param = map(&[("col", Value::from("name desc"))]);
        let bound = source.bound_sql(&param).unwrap();
        assert_eq!(bound.sql, "select * from t order by name desc");
        assert!(bound.bindings.is_empty());
    }

    #[test]
    fn bind_values_resolution_order() {
        // _parameter 别名指整个参数
        let source = parser().parse("select #{_parameter}").unwrap();
        let scalar = Value::from(42);
        let bound = source.bound_sql(&scalar).unwrap();
        assert_eq!(bound.bind_values(&scalar).unwrap(), vec![Value::I64(42)]);

        // _parameter. 前缀走属性导航
        let source = parser().parse("select #{_parameter.name}").unwrap();
        let param = map(&[("name", Value::from("Ann"))]);
        let bound = source.bound_sql(&param).unwrap();
        assert_eq!(bound.bind_values(&param).unwrap(), vec![Value::from("Ann")]);

        // 标量参数整体就是值，名字不参与解析
        let source = parser().parse("select #{whatever}").unwrap();
        let bound = source.bound_sql(&scalar).unwrap();
        assert_eq!(bound.bind_values(&scalar).unwrap(), vec![Value::I64(42)]);

        // map 缺键宽容为 Null
        let param = map(&[]);
        let bound = source.bound_sql(&param).unwrap();
        assert_eq!(bound.bind_values(&param).unwrap(), vec![Value::Null]);

        // Null 参数恒为 Null
        let bound = source.bound_sql(&Value::Null).unwrap();
        assert_eq!(bound.bind_values(&Value::Null).unwrap(), vec![Value::Null]);
    }

    #[test]
    fn undeclared_bean_binding_names_the_expression() {
        let source = parser().parse("select #{nope}").unwrap();
        let param = Order::default().to_value();
        let bound = source.bound_sql(&param).unwrap();
        assert_eq!(
            bound.bind_values(&param).unwrap_err(),
            EvalError::UnresolvedBinding {
                expr: "nope".to_string(),
                cause: PathError::Unresolvable { name: "nope".to_string(), ty: "Order" },
            },
        );
    }

    #[test]
    fn out_of_range_binding_path_is_an_error() {
        let source = parser().parse("select #{lines[0].sku}").unwrap();
        let param = Order { id: 1, lines: Vec::new() }.to_value();
        let bound = source.bound_sql(&param).unwrap();
        assert_eq!(
            bound.bind_values(&param).unwrap_err(),
            EvalError::UnresolvedBinding {
                expr: "lines[0].sku".to_string(),
                cause: PathError::IndexOutOfRange { index: 0, len: 0 },
            },
        );
    }

    #[test]
    fn render_errors_carry_the_bad_expression() {
        let source = parser().parse("<if test=\"a =\">x</if>").unwrap();
        match source.bound_sql(&Value::Null).unwrap_err() {
            EvalError::Syntax { expr, .. } => assert_eq!(expr, "a ="),
            other => panic!("expected syntax error, got {other:?}"),
        }
    }

    #[test]
    fn empty_placeholder_fails_at_the_right_stage() {
        // 静态片段构建期预渲染，占位符错误在 parse 就暴露
        let err = parser().parse("id = #{}").unwrap_err();
        assert!(matches!(
            err,
            BuildError::Placeholder(SyntaxError::EmptyExpression { .. }),
        ));

        // 动态片段推迟到渲染期
        let source = parser().parse("<if test=\"true\">#{}</if>").unwrap();
        let err = source.bound_sql(&Value::Null).unwrap_err();
        assert!(matches!(
            err,
            EvalError::Placeholder(SyntaxError::EmptyExpression { .. }),
        ));
    }
}
