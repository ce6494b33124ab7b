// UDF apply request fields (spec §4.6 Non-goals lift: user-defined
// function application). Three fields carry the call: package name,
// function name, and a message-pack-encoded argument list, using the
// field-type IDs `as_command.h` fixes (`AS_FIELD_UDF_*`).

use aerospike_base::Result;
use aerospike_buf::Value;

use crate::field::{Field, FieldType};

pub fn build_udf_fields(package: &str, function: &str, args: &[Value]) -> Result<Vec<Field>> {
    let mut buf = aerospike_buf::WriteBuf::new();
    Value::List(args.to_vec()).encode(&mut buf)?;

    Ok(vec![
        Field::string(FieldType::UdfPackageName, package),
        Field::string(FieldType::UdfFunction, function),
        Field::new(FieldType::UdfArgList, buf.into_vec()),
    ])
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn builds_three_fields_in_order() {
        let fields = build_udf_fields("mypkg", "myfunc", &[Value::Int(1), Value::String("x".into())]).unwrap();
        assert_eq!(fields.len(), 3);
        assert_eq!(fields[0].kind, FieldType::UdfPackageName);
        assert_eq!(fields[0].data, b"mypkg");
        assert_eq!(fields[1].kind, FieldType::UdfFunction);
        assert_eq!(fields[1].data, b"myfunc");
        assert_eq!(fields[2].kind, FieldType::UdfArgList);
        assert!(!fields[2].data.is_empty());
    }
}
