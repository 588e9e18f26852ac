//! Slotted heap page: an occupancy bitmap followed by fixed-width tuple slots.

use std::sync::Arc;

use bytes::{Buf, BufMut, BytesMut};
use common::{DbError, DbResult, PageId, RecordId, Schema, TransactionId, Tuple};
use types::{STRING_LEN, SqlType, Value};

/// In-memory image of one heap page.
///
/// Layout on disk: `ceil(slots / 8)` header bytes, one bit per slot (bit `i`
/// is bit `i % 8` of byte `i / 8`, set when the slot is occupied), then
/// `slots` fixed-width tuple images, then zero padding up to the page size.
#[derive(Debug, Clone)]
pub struct HeapPage {
    pid: PageId,
    schema: Arc<Schema>,
    page_size: usize,
    header: Vec<u8>,
    tuples: Vec<Option<Tuple>>,
    dirtied_by: Option<TransactionId>,
}

impl HeapPage {
    /// Number of tuple slots a page of `page_size` bytes holds for `schema`.
    pub fn slot_count(page_size: usize, schema: &Schema) -> usize {
        (page_size * 8) / (schema.byte_width() * 8 + 1)
    }

    fn header_len(slots: usize) -> usize {
        slots.div_ceil(8)
    }

    /// Bytes of a freshly allocated page: every slot free.
    pub fn empty_page_data(page_size: usize) -> Vec<u8> {
        vec![0u8; page_size]
    }

    pub fn empty(pid: PageId, schema: Arc<Schema>, page_size: usize) -> Self {
        let slots = Self::slot_count(page_size, &schema);
        Self {
            pid,
            schema,
            page_size,
            header: vec![0u8; Self::header_len(slots)],
            tuples: vec![None; slots],
            dirtied_by: None,
        }
    }

    /// Decode a page image read from disk.
    pub fn from_bytes(
        pid: PageId,
        schema: Arc<Schema>,
        page_size: usize,
        data: &[u8],
    ) -> DbResult<Self> {
        if data.len() != page_size {
            return Err(DbError::Storage(format!(
                "page {pid} image is {} bytes, expected {page_size}",
                data.len()
            )));
        }

        let mut page = Self::empty(pid, schema, page_size);
        let header_len = page.header.len();
        page.header.copy_from_slice(&data[..header_len]);

        let width = page.schema.byte_width();
        for slot in 0..page.tuples.len() {
            if !page.is_slot_used(slot) {
                continue;
            }
            let start = header_len + slot * width;
            let mut buf = &data[start..start + width];
            let mut values = Vec::with_capacity(page.schema.len());
            for field in page.schema.fields() {
                values.push(decode_value(&mut buf, field.ty)?);
            }
            let rid = RecordId { page_id: pid, slot };
            page.tuples[slot] = Some(Tuple::new(values).with_rid(rid));
        }
        Ok(page)
    }

    /// Encode the page into exactly `page_size` bytes.
    pub fn to_bytes(&self) -> DbResult<Vec<u8>> {
        let width = self.schema.byte_width();
        let mut buf = BytesMut::with_capacity(self.page_size);
        buf.put_slice(&self.header);
        for slot in &self.tuples {
            match slot {
                Some(tuple) => {
                    for value in &tuple.values {
                        encode_value(&mut buf, value);
                    }
                }
                None => buf.put_bytes(0, width),
            }
        }
        if buf.len() > self.page_size {
            return Err(DbError::Storage(format!(
                "page {} encodes to {} bytes, exceeding page size {}",
                self.pid,
                buf.len(),
                self.page_size
            )));
        }
        buf.put_bytes(0, self.page_size - buf.len());
        Ok(buf.to_vec())
    }

    pub fn id(&self) -> PageId {
        self.pid
    }

    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    pub fn num_slots(&self) -> usize {
        self.tuples.len()
    }

    pub fn num_empty_slots(&self) -> usize {
        (0..self.num_slots())
            .filter(|&slot| !self.is_slot_used(slot))
            .count()
    }

    pub fn num_occupied_slots(&self) -> usize {
        self.num_slots() - self.num_empty_slots()
    }

    pub fn is_slot_used(&self, slot: usize) -> bool {
        slot < self.num_slots() && self.header[slot / 8] & (1 << (slot % 8)) != 0
    }

    fn set_slot_used(&mut self, slot: usize, used: bool) {
        let mask = 1u8 << (slot % 8);
        if used {
            self.header[slot / 8] |= mask;
        } else {
            self.header[slot / 8] &= !mask;
        }
    }

    /// Place a tuple into the lowest free slot and stamp its record id.
    pub fn insert_tuple(&mut self, mut tuple: Tuple) -> DbResult<RecordId> {
        self.schema.validate(&tuple)?;
        let slot = (0..self.num_slots())
            .find(|&slot| !self.is_slot_used(slot))
            .ok_or_else(|| DbError::Storage(format!("page {} is full", self.pid)))?;

        let rid = RecordId {
            page_id: self.pid,
            slot,
        };
        tuple.set_rid(Some(rid));
        self.tuples[slot] = Some(tuple);
        self.set_slot_used(slot, true);
        Ok(rid)
    }

    /// Free the slot recorded on `tuple`.
    pub fn delete_tuple(&mut self, tuple: &Tuple) -> DbResult<()> {
        let rid = tuple
            .rid()
            .ok_or_else(|| DbError::Storage("tuple has no record id".into()))?;
        if rid.page_id != self.pid {
            return Err(DbError::Storage(format!(
                "tuple lives on page {}, not on page {}",
                rid.page_id, self.pid
            )));
        }
        if !self.is_slot_used(rid.slot) {
            return Err(DbError::Storage(format!(
                "record {rid} is already empty"
            )));
        }
        self.tuples[rid.slot] = None;
        self.set_slot_used(rid.slot, false);
        Ok(())
    }

    pub fn mark_dirty(&mut self, txn: Option<TransactionId>) {
        self.dirtied_by = txn;
    }

    /// Transaction that last dirtied this page, if it is dirty.
    pub fn dirtied_by(&self) -> Option<TransactionId> {
        self.dirtied_by
    }

    pub fn tuple(&self, slot: usize) -> Option<&Tuple> {
        self.tuples.get(slot).and_then(Option::as_ref)
    }

    /// Occupied tuples in slot order.
    pub fn tuples(&self) -> impl Iterator<Item = &Tuple> {
        self.tuples.iter().flatten()
    }
}

fn encode_value(buf: &mut BytesMut, value: &Value) {
    match value {
        Value::Int(v) => buf.put_i32(*v),
        Value::Text(s) => {
            let mut len = s.len().min(STRING_LEN);
            while !s.is_char_boundary(len) {
                len -= 1;
            }
            buf.put_u32(len as u32);
            buf.put_slice(&s.as_bytes()[..len]);
            buf.put_bytes(0, STRING_LEN - len);
        }
    }
}

fn decode_value(buf: &mut &[u8], ty: SqlType) -> DbResult<Value> {
    if buf.remaining() < ty.byte_width() {
        return Err(DbError::Storage(format!(
            "truncated {ty} field: {} bytes left",
            buf.remaining()
        )));
    }
    match ty {
        SqlType::Int => Ok(Value::Int(buf.get_i32())),
        SqlType::Text => {
            let len = buf.get_u32() as usize;
            if len > STRING_LEN {
                return Err(DbError::Storage(format!(
                    "text length {len} exceeds {STRING_LEN}"
                )));
            }
            let text = std::str::from_utf8(&buf[..len])
                .map_err(|e| DbError::Storage(format!("invalid utf-8 in text field: {e}")))?
                .to_string();
            buf.advance(STRING_LEN);
            Ok(Value::Text(text))
        }
    }
}
