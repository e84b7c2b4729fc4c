//! Lowering of a parsed [`FileNode`] to a [`FileDescriptorProto`].
//!
//! Scalar field types are resolved here; named types, extensions and every
//! option other than `default` and `json_name` are left for the linker, the
//! latter encoded as `uninterpreted_option`s. When requested, the descriptor
//! is annotated with `SourceCodeInfo` derived from the file's
//! [`FileInfo`](crate::ast::FileInfo).

#[cfg(test)]
mod tests;

use prost_types::{
    descriptor_proto, enum_descriptor_proto, field_descriptor_proto, source_code_info::Location,
    uninterpreted_option, DescriptorProto, EnumDescriptorProto, EnumOptions,
    EnumValueDescriptorProto, EnumValueOptions, ExtensionRangeOptions, FieldDescriptorProto,
    FieldOptions, FileDescriptorProto, FileOptions, MessageOptions, MethodDescriptorProto,
    MethodOptions, OneofDescriptorProto, ServiceDescriptorProto, ServiceOptions, SourceCodeInfo,
    UninterpretedOption,
};

use crate::{
    ast::{self, FileInfo, FileNode, TokenId},
    parse::ParseError,
    reporter::Handler,
};

pub(crate) const MAX_FIELD_NUMBER: u64 = 536_870_911;

mod tag {
    pub(super) mod file {
        pub const PACKAGE: i32 = 2;
        pub const DEPENDENCY: i32 = 3;
        pub const MESSAGE_TYPE: i32 = 4;
        pub const ENUM_TYPE: i32 = 5;
        pub const SERVICE: i32 = 6;
        pub const EXTENSION: i32 = 7;
        pub const SYNTAX: i32 = 12;
    }

    pub(super) mod message {
        pub const NAME: i32 = 1;
        pub const FIELD: i32 = 2;
        pub const NESTED_TYPE: i32 = 3;
        pub const ENUM_TYPE: i32 = 4;
        pub const EXTENSION: i32 = 6;
        pub const ONEOF_DECL: i32 = 8;
    }

    pub(super) mod field {
        pub const NAME: i32 = 1;
        pub const NUMBER: i32 = 3;
    }

    pub(super) mod enum_ {
        pub const NAME: i32 = 1;
        pub const VALUE: i32 = 2;
    }

    pub(super) mod enum_value {
        pub const NAME: i32 = 1;
        pub const NUMBER: i32 = 2;
    }

    pub(super) mod service {
        pub const NAME: i32 = 1;
        pub const METHOD: i32 = 2;
    }
}

/// Lowers a parsed file to an unlinked `FileDescriptorProto`.
///
/// Problems are reported through `handler`; if any error is recorded the
/// collected diagnostics are returned instead of the descriptor.
pub fn lower(
    file: &FileNode,
    handler: &Handler,
    include_source_info: bool,
) -> Result<FileDescriptorProto, ParseError> {
    let mut ctx = Context {
        info: file.info.as_ref(),
        syntax: file.syntax,
        handler,
        locations: include_source_info.then(Vec::new),
    };

    let descriptor = ctx.lower_file(file);

    if handler.has_errors() {
        Err(ParseError::new(
            file.name(),
            file.file_info().source(),
            handler.take_diagnostics(),
        ))
    } else {
        Ok(descriptor)
    }
}

struct Context<'a> {
    info: &'a FileInfo,
    syntax: ast::Syntax,
    handler: &'a Handler,
    locations: Option<Vec<Location>>,
}

impl<'a> Context<'a> {
    fn lower_file(&mut self, file: &FileNode) -> FileDescriptorProto {
        let mut descriptor = FileDescriptorProto {
            name: Some(file.name().to_owned()),
            ..Default::default()
        };

        self.add_location(vec![], self.whole_file_span());

        if let Some((start, end)) = file.syntax_span {
            self.add_location_for(vec![tag::file::SYNTAX], start, end);
        }
        if file.syntax == ast::Syntax::Proto3 {
            descriptor.syntax = Some("proto3".to_owned());
        }

        if let Some(package) = &file.package {
            descriptor.package = Some(package.name.to_string());
            self.add_location_for(vec![tag::file::PACKAGE], package.start, package.end);
        }

        for (index, import) in file.imports.iter().enumerate() {
            self.add_location_for(
                vec![tag::file::DEPENDENCY, index as i32],
                import.start,
                import.end,
            );
            match import.kind {
                Some(ast::ImportKind::Public) => descriptor
                    .public_dependency
                    .push(index as i32),
                Some(ast::ImportKind::Weak) => descriptor.weak_dependency.push(index as i32),
                None => (),
            }
            descriptor.dependency.push(import.value.clone());
        }

        for definition in &file.definitions {
            match definition {
                ast::Definition::Message(message) => {
                    let path = vec![
                        tag::file::MESSAGE_TYPE,
                        descriptor.message_type.len() as i32,
                    ];
                    descriptor.message_type.push(self.lower_message(message, path));
                }
                ast::Definition::Enum(value) => {
                    let path = vec![tag::file::ENUM_TYPE, descriptor.enum_type.len() as i32];
                    descriptor.enum_type.push(self.lower_enum(value, path));
                }
                ast::Definition::Service(service) => {
                    let path = vec![tag::file::SERVICE, descriptor.service.len() as i32];
                    descriptor.service.push(self.lower_service(service, path));
                }
                ast::Definition::Extension(ext) => {
                    for field in &ext.fields {
                        let path = vec![tag::file::EXTENSION, descriptor.extension.len() as i32];
                        let mut lowered = self.lower_field(field, None, path);
                        lowered.extendee = Some(ext.extendee.to_string());
                        descriptor.extension.push(lowered);
                    }
                }
            }
        }

        if !file.options.is_empty() {
            descriptor.options = Some(FileOptions {
                uninterpreted_option: self.lower_uninterpreted(&file.options),
                ..Default::default()
            });
        }

        if let Some(locations) = self.locations.take() {
            descriptor.source_code_info = Some(SourceCodeInfo {
                location: locations,
            });
        }

        descriptor
    }

    fn lower_message(&mut self, message: &ast::Message, path: Vec<i32>) -> DescriptorProto {
        self.add_location_with_comments(path.clone(), message.start, message.end);
        self.add_location_for(
            extend_path(&path, &[tag::message::NAME]),
            message.name.token,
            message.name.token,
        );

        let mut descriptor = DescriptorProto {
            name: Some(message.name.value.clone()),
            ..Default::default()
        };

        self.lower_message_body(&message.body, &mut descriptor, &path);
        descriptor
    }

    fn lower_message_body(
        &mut self,
        body: &ast::MessageBody,
        descriptor: &mut DescriptorProto,
        path: &[i32],
    ) {
        for field in &body.fields {
            let field_path = extend_path(path, &[tag::message::FIELD, descriptor.field.len() as i32]);
            let mut lowered = self.lower_field(field, None, field_path);

            // In proto3, an explicit `optional` label produces a synthetic
            // oneof containing just this field; its index is assigned below
            // once the declared oneofs are known.
            if self.syntax == ast::Syntax::Proto3
                && matches!(field.label, Some((ast::FieldLabel::Optional, _)))
            {
                lowered.proto3_optional = Some(true);
            }

            descriptor.field.push(lowered);
        }

        for map_field in &body.map_fields {
            let field_path =
                extend_path(path, &[tag::message::FIELD, descriptor.field.len() as i32]);
            let (field, entry) = self.lower_map_field(map_field, field_path);
            descriptor.field.push(field);
            descriptor.nested_type.push(entry);
        }

        let declared_oneofs = body.oneofs.len();
        for (index, oneof) in body.oneofs.iter().enumerate() {
            self.add_location_with_comments(
                extend_path(path, &[tag::message::ONEOF_DECL, index as i32]),
                oneof.start,
                oneof.end,
            );
            descriptor.oneof_decl.push(OneofDescriptorProto {
                name: Some(oneof.name.value.clone()),
                ..Default::default()
            });

            for field in &oneof.fields {
                let field_path =
                    extend_path(path, &[tag::message::FIELD, descriptor.field.len() as i32]);
                let mut lowered = self.lower_field(field, Some(index as i32), field_path);
                lowered.label = Some(field_descriptor_proto::Label::Optional as i32);
                descriptor.field.push(lowered);
            }
        }

        // Synthetic oneofs for proto3 optional fields come after all
        // declared ones, in field order.
        if self.syntax == ast::Syntax::Proto3 {
            let mut synthetic = declared_oneofs;
            for field in descriptor.field.iter_mut() {
                if field.proto3_optional == Some(true) {
                    field.oneof_index = Some(synthetic as i32);
                    synthetic += 1;
                }
            }
            for field in &body.fields {
                if matches!(field.label, Some((ast::FieldLabel::Optional, _))) {
                    descriptor.oneof_decl.push(OneofDescriptorProto {
                        name: Some(format!("_{}", field.name.value)),
                        ..Default::default()
                    });
                }
            }
        }

        for message in &body.messages {
            let nested_path = extend_path(
                path,
                &[tag::message::NESTED_TYPE, descriptor.nested_type.len() as i32],
            );
            let nested = self.lower_message(message, nested_path);
            descriptor.nested_type.push(nested);
        }

        for value in &body.enums {
            let enum_path = extend_path(
                path,
                &[tag::message::ENUM_TYPE, descriptor.enum_type.len() as i32],
            );
            let lowered = self.lower_enum(value, enum_path);
            descriptor.enum_type.push(lowered);
        }

        for ext in &body.extensions {
            for field in &ext.fields {
                let ext_path = extend_path(
                    path,
                    &[tag::message::EXTENSION, descriptor.extension.len() as i32],
                );
                let mut lowered = self.lower_field(field, None, ext_path);
                lowered.extendee = Some(ext.extendee.to_string());
                descriptor.extension.push(lowered);
            }
        }

        for range in &body.extension_ranges {
            let options = if range.options.is_empty() {
                None
            } else {
                Some(ExtensionRangeOptions {
                    uninterpreted_option: self.lower_uninterpreted(&range.options),
                    ..Default::default()
                })
            };
            for reserved in &range.ranges {
                let (start, end) = self.lower_range(reserved, MAX_FIELD_NUMBER as i32 + 1, false);
                descriptor
                    .extension_range
                    .push(descriptor_proto::ExtensionRange {
                        start: Some(start),
                        end: Some(end),
                        options: options.clone(),
                    });
            }
        }

        for reserved in &body.reserved {
            match reserved {
                ast::Reserved::Ranges(ranges) => {
                    for range in ranges {
                        let (start, end) = self.lower_range(range, MAX_FIELD_NUMBER as i32 + 1, false);
                        descriptor
                            .reserved_range
                            .push(descriptor_proto::ReservedRange {
                                start: Some(start),
                                end: Some(end),
                            });
                    }
                }
                ast::Reserved::Names(names) => {
                    for name in names {
                        descriptor.reserved_name.push(name.value.clone());
                    }
                }
            }
        }

        if !body.options.is_empty() {
            descriptor.options = Some(MessageOptions {
                uninterpreted_option: self.lower_uninterpreted(&body.options),
                ..Default::default()
            });
        }
    }

    fn lower_field(
        &mut self,
        field: &ast::Field,
        oneof_index: Option<i32>,
        path: Vec<i32>,
    ) -> FieldDescriptorProto {
        self.add_location_with_comments(path.clone(), field.start, field.end);
        self.add_location_for(
            extend_path(&path, &[tag::field::NAME]),
            field.name.token,
            field.name.token,
        );
        self.add_location_for(
            extend_path(&path, &[tag::field::NUMBER]),
            field.number.token,
            field.number.token,
        );

        let mut descriptor = FieldDescriptorProto {
            name: Some(field.name.value.clone()),
            number: Some(self.check_field_number(&field.number)),
            json_name: Some(to_json_name(&field.name.value)),
            oneof_index,
            ..Default::default()
        };

        let label = if oneof_index.is_some() {
            field_descriptor_proto::Label::Optional
        } else {
            self.lower_label(field)
        };
        descriptor.label = Some(label as i32);
        self.lower_field_ty(&field.ty, &mut descriptor);
        self.lower_field_options(&field.options, &mut descriptor);

        descriptor
    }

    fn lower_label(&mut self, field: &ast::Field) -> field_descriptor_proto::Label {
        use field_descriptor_proto::Label;

        match (self.syntax, field.label) {
            (_, Some((ast::FieldLabel::Repeated, _))) => Label::Repeated,
            (ast::Syntax::Proto2, Some((ast::FieldLabel::Required, _))) => Label::Required,
            (ast::Syntax::Proto2, Some((ast::FieldLabel::Optional, _))) => Label::Optional,
            (ast::Syntax::Proto2, None) => {
                let span = self.span_for(field.start, field.end);
                let _ = self.handler.error(
                    Some(self.info.position(span.start)),
                    Some(span),
                    "fields must have a label with proto2 syntax (expected one of 'optional', \
                     'repeated' or 'required')",
                );
                Label::Optional
            }
            (ast::Syntax::Proto3, Some((ast::FieldLabel::Required, token))) => {
                let span = self.token_byte_span(token);
                let _ = self.handler.error(
                    Some(self.info.position(span.start)),
                    Some(span),
                    "required fields are not allowed in proto3 syntax",
                );
                Label::Optional
            }
            (ast::Syntax::Proto3, _) => Label::Optional,
        }
    }

    fn lower_field_ty(&mut self, ty: &ast::Ty, descriptor: &mut FieldDescriptorProto) {
        use field_descriptor_proto::Type;

        let scalar = match ty {
            ast::Ty::Double => Type::Double,
            ast::Ty::Float => Type::Float,
            ast::Ty::Int32 => Type::Int32,
            ast::Ty::Int64 => Type::Int64,
            ast::Ty::Uint32 => Type::Uint32,
            ast::Ty::Uint64 => Type::Uint64,
            ast::Ty::Sint32 => Type::Sint32,
            ast::Ty::Sint64 => Type::Sint64,
            ast::Ty::Fixed32 => Type::Fixed32,
            ast::Ty::Fixed64 => Type::Fixed64,
            ast::Ty::Sfixed32 => Type::Sfixed32,
            ast::Ty::Sfixed64 => Type::Sfixed64,
            ast::Ty::Bool => Type::Bool,
            ast::Ty::String => Type::String,
            ast::Ty::Bytes => Type::Bytes,
            ast::Ty::Named(name) => {
                // Message or enum is not known until the linker resolves the
                // name, so the type field stays unset.
                descriptor.type_name = Some(name.to_string());
                return;
            }
        };
        descriptor.r#type = Some(scalar as i32);
    }

    fn lower_map_field(
        &mut self,
        field: &ast::MapField,
        path: Vec<i32>,
    ) -> (FieldDescriptorProto, DescriptorProto) {
        use field_descriptor_proto::{Label, Type};

        self.add_location_with_comments(path.clone(), field.start, field.end);
        self.add_location_for(
            extend_path(&path, &[tag::field::NAME]),
            field.name.token,
            field.name.token,
        );

        let entry_name = format!("{}Entry", to_pascal_case(&field.name.value));

        let mut key = FieldDescriptorProto {
            name: Some("key".to_owned()),
            json_name: Some("key".to_owned()),
            number: Some(1),
            label: Some(Label::Optional as i32),
            ..Default::default()
        };
        key.r#type = Some(match field.key_ty {
            ast::KeyTy::Int32 => Type::Int32,
            ast::KeyTy::Int64 => Type::Int64,
            ast::KeyTy::Uint32 => Type::Uint32,
            ast::KeyTy::Uint64 => Type::Uint64,
            ast::KeyTy::Sint32 => Type::Sint32,
            ast::KeyTy::Sint64 => Type::Sint64,
            ast::KeyTy::Fixed32 => Type::Fixed32,
            ast::KeyTy::Fixed64 => Type::Fixed64,
            ast::KeyTy::Sfixed32 => Type::Sfixed32,
            ast::KeyTy::Sfixed64 => Type::Sfixed64,
            ast::KeyTy::Bool => Type::Bool,
            ast::KeyTy::String => Type::String,
        } as i32);

        let mut value = FieldDescriptorProto {
            name: Some("value".to_owned()),
            json_name: Some("value".to_owned()),
            number: Some(2),
            label: Some(Label::Optional as i32),
            ..Default::default()
        };
        self.lower_field_ty(&field.ty, &mut value);

        let entry = DescriptorProto {
            name: Some(entry_name.clone()),
            field: vec![key, value],
            options: Some(MessageOptions {
                map_entry: Some(true),
                ..Default::default()
            }),
            ..Default::default()
        };

        let mut descriptor = FieldDescriptorProto {
            name: Some(field.name.value.clone()),
            number: Some(self.check_field_number(&field.number)),
            json_name: Some(to_json_name(&field.name.value)),
            label: Some(Label::Repeated as i32),
            type_name: Some(entry_name),
            ..Default::default()
        };
        self.lower_field_options(&field.options, &mut descriptor);

        (descriptor, entry)
    }

    fn lower_field_options(
        &mut self,
        options: &[ast::OptionNode],
        descriptor: &mut FieldDescriptorProto,
    ) {
        let mut uninterpreted = Vec::new();
        for option in options {
            match simple_option_name(option) {
                Some("default") => {
                    descriptor.default_value = Some(self.default_value_string(&option.value))
                }
                Some("json_name") => {
                    if let ast::Constant::Str(value) = &option.value {
                        if let Some(name) = value.as_utf8() {
                            descriptor.json_name = Some(name.to_owned());
                            continue;
                        }
                    }
                    let span = self.span_for(option.start, option.end);
                    let _ = self.handler.error(
                        Some(self.info.position(span.start)),
                        Some(span),
                        "json_name must be a string",
                    );
                }
                _ => uninterpreted.push(self.uninterpreted_option(option)),
            }
        }

        if !uninterpreted.is_empty() {
            descriptor.options = Some(FieldOptions {
                uninterpreted_option: uninterpreted,
                ..Default::default()
            });
        }
    }

    fn default_value_string(&mut self, value: &ast::Constant) -> String {
        match value {
            ast::Constant::FullIdent(ident) => ident.to_string(),
            ast::Constant::Int(int) if int.negative => format!("-{}", int.value),
            ast::Constant::Int(int) => int.value.to_string(),
            ast::Constant::Float(float) if float.negative => format!("-{}", float.value),
            ast::Constant::Float(float) => float.value.to_string(),
            ast::Constant::Bool(value) => value.value.to_string(),
            ast::Constant::Str(value) => String::from_utf8_lossy(&value.value).into_owned(),
        }
    }

    fn lower_enum(&mut self, value: &ast::Enum, path: Vec<i32>) -> EnumDescriptorProto {
        self.add_location_with_comments(path.clone(), value.start, value.end);
        self.add_location_for(
            extend_path(&path, &[tag::enum_::NAME]),
            value.name.token,
            value.name.token,
        );

        let mut descriptor = EnumDescriptorProto {
            name: Some(value.name.value.clone()),
            ..Default::default()
        };

        for (index, enum_value) in value.values.iter().enumerate() {
            let value_path = extend_path(&path, &[tag::enum_::VALUE, index as i32]);
            self.add_location_with_comments(value_path.clone(), enum_value.start, enum_value.end);
            self.add_location_for(
                extend_path(&value_path, &[tag::enum_value::NAME]),
                enum_value.name.token,
                enum_value.name.token,
            );
            self.add_location_for(
                extend_path(&value_path, &[tag::enum_value::NUMBER]),
                enum_value.value.token,
                enum_value.value.token,
            );

            let mut lowered = EnumValueDescriptorProto {
                name: Some(enum_value.name.value.clone()),
                number: Some(self.check_enum_number(&enum_value.value)),
                ..Default::default()
            };
            if !enum_value.options.is_empty() {
                lowered.options = Some(EnumValueOptions {
                    uninterpreted_option: self.lower_uninterpreted(&enum_value.options),
                    ..Default::default()
                });
            }
            descriptor.value.push(lowered);
        }

        for reserved in &value.reserved {
            match reserved {
                ast::Reserved::Ranges(ranges) => {
                    for range in ranges {
                        let (start, end) = self.lower_range(range, i32::MAX, true);
                        descriptor
                            .reserved_range
                            .push(enum_descriptor_proto::EnumReservedRange {
                                start: Some(start),
                                end: Some(end),
                            });
                    }
                }
                ast::Reserved::Names(names) => {
                    for name in names {
                        descriptor.reserved_name.push(name.value.clone());
                    }
                }
            }
        }

        if !value.options.is_empty() {
            descriptor.options = Some(EnumOptions {
                uninterpreted_option: self.lower_uninterpreted(&value.options),
                ..Default::default()
            });
        }

        descriptor
    }

    fn lower_service(&mut self, service: &ast::Service, path: Vec<i32>) -> ServiceDescriptorProto {
        self.add_location_with_comments(path.clone(), service.start, service.end);
        self.add_location_for(
            extend_path(&path, &[tag::service::NAME]),
            service.name.token,
            service.name.token,
        );

        let mut descriptor = ServiceDescriptorProto {
            name: Some(service.name.value.clone()),
            ..Default::default()
        };

        for (index, method) in service.methods.iter().enumerate() {
            let method_path = extend_path(&path, &[tag::service::METHOD, index as i32]);
            self.add_location_with_comments(method_path, method.start, method.end);

            let mut lowered = MethodDescriptorProto {
                name: Some(method.name.value.clone()),
                input_type: Some(method.input_ty.to_string()),
                output_type: Some(method.output_ty.to_string()),
                ..Default::default()
            };
            if method.is_client_streaming {
                lowered.client_streaming = Some(true);
            }
            if method.is_server_streaming {
                lowered.server_streaming = Some(true);
            }
            if !method.options.is_empty() {
                lowered.options = Some(MethodOptions {
                    uninterpreted_option: self.lower_uninterpreted(&method.options),
                    ..Default::default()
                });
            }
            descriptor.method.push(lowered);
        }

        if !service.options.is_empty() {
            descriptor.options = Some(ServiceOptions {
                uninterpreted_option: self.lower_uninterpreted(&service.options),
                ..Default::default()
            });
        }

        descriptor
    }

    fn lower_uninterpreted(&mut self, options: &[ast::OptionNode]) -> Vec<UninterpretedOption> {
        options
            .iter()
            .map(|option| self.uninterpreted_option(option))
            .collect()
    }

    fn uninterpreted_option(&mut self, option: &ast::OptionNode) -> UninterpretedOption {
        let name = option
            .name
            .iter()
            .map(|part| match part {
                ast::OptionNamePart::Ident(ident) => uninterpreted_option::NamePart {
                    name_part: ident.value.clone(),
                    is_extension: false,
                },
                ast::OptionNamePart::Extension(type_name) => uninterpreted_option::NamePart {
                    name_part: type_name.to_string(),
                    is_extension: true,
                },
            })
            .collect();

        let mut descriptor = UninterpretedOption {
            name,
            ..Default::default()
        };

        match &option.value {
            ast::Constant::FullIdent(ident) => {
                descriptor.identifier_value = Some(ident.to_string())
            }
            ast::Constant::Bool(value) => {
                descriptor.identifier_value = Some(value.value.to_string())
            }
            ast::Constant::Int(int) if int.negative => {
                if int.value > i64::MAX as u64 + 1 {
                    self.number_error(int, "integer is out of range");
                } else {
                    descriptor.negative_int_value = Some((int.value as i128).wrapping_neg() as i64);
                }
            }
            ast::Constant::Int(int) => descriptor.positive_int_value = Some(int.value),
            ast::Constant::Float(float) if float.negative => {
                descriptor.double_value = Some(-float.value)
            }
            ast::Constant::Float(float) => descriptor.double_value = Some(float.value),
            ast::Constant::Str(value) => descriptor.string_value = Some(value.value.clone()),
        }

        descriptor
    }

    fn check_field_number(&mut self, number: &ast::Int) -> i32 {
        if number.negative || number.value == 0 || number.value > MAX_FIELD_NUMBER {
            self.number_error(
                number,
                format!("field numbers must be between 1 and {}", MAX_FIELD_NUMBER),
            );
            return 1;
        }
        number.value as i32
    }

    fn check_enum_number(&mut self, number: &ast::Int) -> i32 {
        let value = if number.negative {
            (number.value as i128).wrapping_neg()
        } else {
            number.value as i128
        };
        if value < i32::MIN as i128 || value > i32::MAX as i128 {
            self.number_error(
                number,
                format!(
                    "enum numbers must be between {} and {}",
                    i32::MIN,
                    i32::MAX
                ),
            );
            return 0;
        }
        value as i32
    }

    fn number_error(&mut self, number: &ast::Int, message: impl Into<String>) {
        let span = self.token_byte_span(number.token);
        let _ = self
            .handler
            .error(Some(self.info.position(span.start)), Some(span), message);
    }

    fn lower_range(&mut self, range: &ast::ReservedRange, max: i32, inclusive: bool) -> (i32, i32) {
        let start = if range.start.negative || range.start.value > i32::MAX as u64 {
            self.number_error(&range.start, "range start is out of range");
            1
        } else {
            range.start.value as i32
        };

        let end = match &range.end {
            ast::RangeEnd::None => {
                if inclusive {
                    start
                } else {
                    start + 1
                }
            }
            ast::RangeEnd::Max(_) => max,
            ast::RangeEnd::Int(end) => {
                let end = if end.negative || end.value > i32::MAX as u64 {
                    self.number_error(end, "range end is out of range");
                    start
                } else {
                    end.value as i32
                };
                if inclusive {
                    end
                } else {
                    end + 1
                }
            }
        };

        (start, end)
    }

    fn span_for(&self, start: TokenId, end: TokenId) -> std::ops::Range<usize> {
        self.info.token(start).start().offset..self.info.token(end).end().offset + 1
    }

    fn token_byte_span(&self, token: TokenId) -> std::ops::Range<usize> {
        self.span_for(token, token)
    }

    fn whole_file_span(&self) -> Vec<i32> {
        let end = self.info.position(self.info.source().len());
        span_vec((1, 1), (end.line, end.col))
    }

    /// Records a location without comments.
    fn add_location_for(&mut self, path: Vec<i32>, start: TokenId, end: TokenId) {
        let span = self.resolve_span(start, end);
        self.add_location(path, span);
    }

    fn add_location(&mut self, path: Vec<i32>, span: Vec<i32>) {
        if let Some(locations) = &mut self.locations {
            locations.push(Location {
                path,
                span,
                ..Default::default()
            });
        }
    }

    /// Records a location for a declaration, attaching the comments
    /// attributed to its first and last tokens.
    fn add_location_with_comments(&mut self, path: Vec<i32>, start: TokenId, end: TokenId) {
        if self.locations.is_none() {
            return;
        }

        let span = self.resolve_span(start, end);
        let (leading_detached, leading) = self.leading_comments(start);
        let trailing = self.trailing_comments(end);

        if let Some(locations) = &mut self.locations {
            locations.push(Location {
                path,
                span,
                leading_comments: leading,
                trailing_comments: trailing,
                leading_detached_comments: leading_detached,
            });
        }
    }

    fn resolve_span(&self, start: TokenId, end: TokenId) -> Vec<i32> {
        let start = self.info.token(start).start();
        let end = self.info.token(end).end();
        // One-based inclusive end column is the same as zero-based exclusive.
        span_vec((start.line, start.col), (end.line, end.col + 1))
    }

    /// Splits the comments leading a token into detached groups and the
    /// group directly adjacent to the token, concatenating each group's
    /// text.
    fn leading_comments(&self, token: TokenId) -> (Vec<String>, Option<String>) {
        let token = self.info.token(token);
        let comments = token.leading_comments();
        if comments.is_empty() {
            return (Vec::new(), None);
        }

        let mut groups: Vec<String> = Vec::new();
        let mut group = String::new();
        let mut last_end_line = None;

        for comment in comments.iter() {
            let start_line = comment.start().line;
            if let Some(last) = last_end_line {
                if start_line > last + 1 {
                    groups.push(std::mem::take(&mut group));
                }
            }
            group.push_str(&comment_text(comment.raw_text()));
            last_end_line = Some(comment.end().line);
        }
        groups.push(group);

        // The last group only counts as directly leading if no blank line
        // separates it from the token.
        let attached = match last_end_line {
            Some(last) if token.start().line <= last + 1 => groups.pop(),
            _ => None,
        };

        (groups, attached)
    }

    fn trailing_comments(&self, token: TokenId) -> Option<String> {
        let comments = self.info.token(token).trailing_comments();
        if comments.is_empty() {
            return None;
        }

        let mut text = String::new();
        for comment in comments.iter() {
            text.push_str(&comment_text(comment.raw_text()));
        }
        Some(text)
    }
}

fn extend_path(path: &[i32], tail: &[i32]) -> Vec<i32> {
    let mut extended = path.to_vec();
    extended.extend_from_slice(tail);
    extended
}

fn span_vec(start: (usize, usize), end: (usize, usize)) -> Vec<i32> {
    let (start_line, start_col) = (start.0 as i32 - 1, start.1 as i32 - 1);
    let (end_line, end_col) = (end.0 as i32 - 1, end.1 as i32 - 1);
    if start_line == end_line {
        vec![start_line, start_col, end_col]
    } else {
        vec![start_line, start_col, end_line, end_col]
    }
}

fn simple_option_name(option: &ast::OptionNode) -> Option<&str> {
    match option.name.as_slice() {
        [ast::OptionNamePart::Ident(ident)] => Some(ident.value.as_str()),
        _ => None,
    }
}

/// The text of a comment without its delimiters: everything after `//` for a
/// line comment (trailing newline included), or between `/*` and `*/` for a
/// block comment.
fn comment_text(raw: &str) -> String {
    if let Some(content) = raw.strip_prefix("//") {
        content.to_owned()
    } else {
        raw.strip_prefix("/*")
            .and_then(|content| content.strip_suffix("*/"))
            .unwrap_or(raw)
            .to_owned()
    }
}

fn to_json_name(name: &str) -> String {
    let mut result = String::with_capacity(name.len());
    let mut uppercase_next = false;
    for ch in name.chars() {
        if ch == '_' {
            uppercase_next = true;
        } else if uppercase_next {
            result.push(ch.to_ascii_uppercase());
            uppercase_next = false;
        } else {
            result.push(ch);
        }
    }
    result
}

fn to_pascal_case(name: &str) -> String {
    let mut result = String::with_capacity(name.len());
    let mut uppercase_next = true;
    for ch in name.chars() {
        if ch == '_' {
            uppercase_next = true;
        } else if uppercase_next {
            result.push(ch.to_ascii_uppercase());
            uppercase_next = false;
        } else {
            result.push(ch);
        }
    }
    result
}
