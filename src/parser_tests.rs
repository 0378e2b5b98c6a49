#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use crate::config::MapperConfig;
    use crate::flavor::Flavor;
    use crate::nodes::{ForEachNode, SqlNode, TrimNode};
    use crate::parser::{BuildError, TemplateParser};
    use crate::value::Value;

    fn stext(s: &str) -> SqlNode {
        SqlNode::StaticText(s.to_string())
    }

    fn mixed(children: Vec<SqlNode>) -> SqlNode {
        SqlNode::Mixed(children)
    }

    #[test]
    fn classifies_static_and_dynamic_fragments() {
        let parser = TemplateParser::new();
        let cases: &[(&str, bool)] = &[
            ("select * from users where id = #{id}", false),
            ("select * from ${table}", true),
            ("select 1 <if test=\"x\">, 2</if>", true),
            (r"select \${literal}", false),
            ("", false),
        ];
        for (fragment, expected) in cases {
            let (_, dynamic) = parser.parse_fragment(fragment).unwrap();
            assert_eq!(dynamic, *expected, "fragment: {fragment:?}");
        }
    }

    #[test]
    fn plain_text_keeps_raw_whitespace() {
        let parser = TemplateParser::new();
        let (root, _) = parser.parse_fragment("  a  \n  b  ").unwrap();
        assert_eq!(root, mixed(vec![stext("  a  \n  b  ")]));
    }

    #[test]
    fn if_element_builds_a_guarded_subtree() {
        let parser = TemplateParser::new();
        let (root, dynamic) =
            parser.parse_fragment("<if test=\"id != null\">AND id = #{id}</if>").unwrap();
        assert!(dynamic);
        assert_eq!(
            root,
            mixed(vec![SqlNode::If {
                test: "id != null".to_string(),
                body: Box::new(mixed(vec![stext("AND id = #{id}")])),
            }]),
        );
    }

    #[test]
    fn standalone_when_and_otherwise_degrade_gracefully() {
        let parser = TemplateParser::new();
        let (root, _) = parser.parse_fragment("<when test=\"a\">X</when>").unwrap();
        assert_eq!(
            root,
            mixed(vec![SqlNode::If {
                test: "a".to_string(),
                body: Box::new(mixed(vec![stext("X")])),
            }]),
        );

        let (root, _) = parser.parse_fragment("<otherwise>X</otherwise>").unwrap();
        assert_eq!(root, mixed(vec![mixed(vec![stext("X")])]));
    }

    #[test]
    fn choose_collects_whens_and_otherwise() {
        let parser = TemplateParser::new();
        let frag = "<choose><when test=\"a == 1\">A</when>stray\
                    <when test=\"b == 1\">B</when><otherwise>C</otherwise></choose>";
        let (root, _) = parser.parse_fragment(frag).unwrap();
        assert_eq!(
            root,
            mixed(vec![SqlNode::Choose {
                whens: vec![
                    ("a == 1".to_string(), mixed(vec![stext("A")])),
                    ("b == 1".to_string(), mixed(vec![stext("B")])),
                ],
                otherwise: Some(Box::new(mixed(vec![stext("C")]))),
            }]),
        );
    }

    #[test]
    fn second_otherwise_is_rejected() {
        let parser = TemplateParser::new();
        let err = parser
            .parse_fragment("<choose><otherwise>1</otherwise><otherwise>2</otherwise></choose>")
            .unwrap_err();
        assert_eq!(err, BuildError::TooManyOtherwise);
    }

    #[test]
    fn missing_required_attributes_are_named() {
        let parser = TemplateParser::new();
        let cases: &[(&str, &str, &str)] = &[
            ("<if>x</if>", "if", "test"),
            ("<when>x</when>", "when", "test"),
            ("<choose><when>x</when></choose>", "when", "test"),
            ("<foreach item=\"i\">x</foreach>", "foreach", "collection"),
            ("<foreach collection=\"c\">x</foreach>", "foreach", "item"),
            ("<bind value=\"v\"/>", "bind", "name"),
            ("<bind name=\"n\"/>", "bind", "value"),
        ];
        for (fragment, tag, attr) in cases {
            assert_eq!(
                parser.parse_fragment(fragment).unwrap_err(),
                BuildError::MissingAttribute { tag: tag.to_string(), attr },
                "fragment: {fragment:?}",
            );
        }
    }

    #[test]
    fn unknown_elements_are_named() {
        let parser = TemplateParser::new();
        assert_eq!(
            parser.parse_fragment("<isNotNull property=\"x\">y</isNotNull>").unwrap_err(),
            BuildError::UnknownElement { tag: "isNotNull".to_string() },
        );
    }

    #[test]
    fn trim_where_set_share_one_node_shape() {
        let parser = TemplateParser::new();
        let (root, _) = parser
            .parse_fragment(
                "<trim prefix=\"WHERE\" prefixOverrides=\"AND |OR \">AND x=1</trim>",
            )
            .unwrap();
        assert_eq!(
            root,
            mixed(vec![SqlNode::Trim(Box::new(TrimNode {
                prefix: Some("WHERE".to_string()),
                prefix_overrides: vec!["AND ".to_string(), "OR ".to_string()],
                suffix: None,
                suffix_overrides: Vec::new(),
                body: mixed(vec![stext("AND x=1")]),
            }))]),
        );

        let (root, _) =
            parser.parse_fragment("<where>AND x=1</where>").unwrap();
        assert_eq!(root, mixed(vec![SqlNode::where_clause(mixed(vec![stext("AND x=1")]))]));

        let (root, _) = parser.parse_fragment("<set>a = 1,</set>").unwrap();
        assert_eq!(root, mixed(vec![SqlNode::set_clause(mixed(vec![stext("a = 1,")]))]));
    }

    #[test]
    fn foreach_attributes_default_to_empty() {
        let parser = TemplateParser::new();
        let (root, _) = parser
            .parse_fragment("<foreach collection=\"ids\" item=\"id\">#{id}</foreach>")
            .unwrap();
        assert_eq!(
            root,
            mixed(vec![SqlNode::ForEach(Box::new(ForEachNode {
                collection: "ids".to_string(),
                item: "id".to_string(),
                index: None,
                open: String::new(),
                close: String::new(),
                separator: String::new(),
                body: mixed(vec![stext("#{id}")]),
            }))]),
        );

        // 多余的属性不参与构建
        parser
            .parse_fragment("<foreach collection=\"ids\" item=\"id\" extra=\"z\">#{id}</foreach>")
            .unwrap();
    }

    #[test]
    fn attribute_values_are_unescaped() {
        let parser = TemplateParser::new();
        let (root, _) = parser.parse_fragment("<if test=\"a &lt; b\">x</if>").unwrap();
        let expected = SqlNode::If {
            test: "a < b".to_string(),
            body: Box::new(mixed(vec![stext("x")])),
        };
        assert_eq!(root, mixed(vec![expected]));

        let (root, _) =
            parser.parse_fragment("<if test=\"a &amp;&amp; b\">x</if>").unwrap();
        let expected = SqlNode::If {
            test: "a && b".to_string(),
            body: Box::new(mixed(vec![stext("x")])),
        };
        assert_eq!(root, mixed(vec![expected]));
    }

    #[test]
    fn text_entities_resolve_and_merge() {
        let parser = TemplateParser::new();
        let cases: &[(&str, &str)] = &[
            ("a &lt; b", "a < b"),
            ("a &gt;= b &amp;&amp; c", "a >= b && c"),
            ("it&apos;s &quot;x&quot;", "it's \"x\""),
            ("&#65;&#x42;c", "ABc"),
            // 未知实体原样保留
            ("a &foo; b", "a &foo; b"),
        ];
        for (fragment, expected) in cases {
            let (root, _) = parser.parse_fragment(fragment).unwrap();
            assert_eq!(root, mixed(vec![stext(expected)]), "fragment: {fragment:?}");
        }
    }

    #[test]
    fn cdata_text_joins_neighbours() {
        let parser = TemplateParser::new();
        let (root, _) =
            parser.parse_fragment("foo <![CDATA[a < b && c]]> bar").unwrap();
        assert_eq!(root, mixed(vec![stext("foo a < b && c bar")]));
    }

    #[test]
    fn malformed_markup_is_a_build_error() {
        let parser = TemplateParser::new();
        let cases = ["<if test='a'>x", "</if>", "<a><b></a></b>"];
        for fragment in cases {
            assert!(
                matches!(parser.parse_fragment(fragment), Err(BuildError::Xml(_))),
                "fragment: {fragment:?}",
            );
        }
    }

    #[test]
    fn parse_prerenders_pure_text_sources() {
        // 并行测试可能临时改全局默认方言，这里显式固定
        let config = MapperConfig::new().with_flavor(Flavor::MySQL);
        let parser = TemplateParser::with_config(config);
        let source = parser.parse("select * from users where id = #{id}").unwrap();
        let bound = source.bound_sql(&Value::Null).unwrap();
        assert_eq!(bound.sql, "select * from users where id = ?");
        assert_eq!(bound.bindings.len(), 1);
        assert_eq!(bound.bindings[0].property, "id");
        assert!(bound.extras.is_empty());

        let source = parser.parse("select * from ${table}").unwrap();
        let param: Value = [("table", Value::from("users"))].into_iter().collect();
        let bound = source.bound_sql(&param).unwrap();
        assert_eq!(bound.sql, "select * from users");
        assert!(bound.bindings.is_empty());
    }
}
