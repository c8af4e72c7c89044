/// Test fixtures: representative payloads from each network.
///
/// Structurally complete but cut down to the rows needed to exercise the
/// decoders.
///
/// HRFCO level series (`waterlevel/list/{10M|1H|1D}/...json`):
///   content[]
///     .wlobscd — station code (string)
///     .ymdhm   — KST wall clock, `yyyyMMddHHmm`
///     .wl      — level in metres as a padded STRING, blank when missing
///
/// NIER quality series (`getRealTimeWaterQualityList`, returnType=json):
///   response.header.resultCode — "00" ok, "03" no data, others errors
///   response.body.items.item   — array, a bare object, or `items: ""`
///     .msrDate — KST wall clock, `yyyy-MM-dd HH:mm`
///     .item*   — one field per measured quantity, strings
///
/// AutoNet series: XML `<item>` blocks with `msrDate` in UTC and numbered
/// measurement tags. Self-closing tags mark missing measurements.

pub const HRFCO_SERIES_10M: &str = r#"{
  "content": [
    { "wlobscd": "1018683", "ymdhm": "202405011330", "wl": " 2.41", "fw": "  212.30" },
    { "wlobscd": "1018683", "ymdhm": "202405011340", "wl": " 2.43", "fw": "  215.10" },
    { "wlobscd": "1018683", "ymdhm": "202405011350", "wl": "", "fw": "" },
    { "wlobscd": "1018683", "ymdhm": "202405011400", "wl": " 2.45", "fw": "  218.00" }
  ]
}"#;

/// A single-station request answered with a neighboring gauge mixed in.
pub const HRFCO_SERIES_MIXED: &str = r#"{
  "content": [
    { "wlobscd": "1018680", "ymdhm": "202405011400", "wl": " 3.10" },
    { "wlobscd": "1018683", "ymdhm": "202405011400", "wl": " 2.45" }
  ]
}"#;

pub const HRFCO_ERROR: &str = r#"{ "message": "인증키가 유효하지 않습니다." }"#;

/// `waterlevel/info.json` station catalog. The second row uses the
/// `station_nm` alias some deployments return instead of `obsnm`.
pub const HRFCO_INFO: &str = r#"{
  "content": [
    {
      "wlobscd": "1018683", "obsnm": "서울시(한강대교)", "agcnm": "한강홍수통제소",
      "addr": "서울특별시 용산구 이촌동", "lat": "37-31-02", "lon": "126-57-29"
    },
    {
      "wlobscd": "1018640", "station_nm": "남양주시(팔당댐)", "agcnm": "한국수자원공사",
      "addr": "경기도 남양주시 조안면", "lat": "37-31-29", "lon": "127-16-48"
    },
    { "wlobscd": "", "obsnm": "코드없음" }
  ]
}"#;

pub const NIER_SERIES: &str = r#"{
  "response": {
    "header": { "resultCode": "00", "resultMsg": "NORMAL SERVICE." },
    "body": {
      "items": {
        "item": [
          { "siteId": "1018A30", "msrDate": "2024-05-01 12:00", "itemTemp": "18.2", "itemPh": "7.6" },
          { "siteId": "1018A30", "msrDate": "2024-05-01 13:00", "itemTemp": "18.6", "itemPh": "7.7" },
          { "siteId": "1018A30", "msrDate": "2024-05-01 14:00", "itemTemp": "", "itemPh": "7.7" }
        ]
      },
      "numOfRows": 1000, "pageNo": 1, "totalCount": 3
    }
  }
}"#;

pub const NIER_SINGLE_ITEM: &str = r#"{
  "response": {
    "header": { "resultCode": "00", "resultMsg": "NORMAL SERVICE." },
    "body": {
      "items": { "item": { "siteId": "1018A30", "msrDate": "2024-05-01 14:00", "itemTemp": 30 } },
      "numOfRows": 1000, "pageNo": 1, "totalCount": 1
    }
  }
}"#;

pub const NIER_BLANK_ITEMS: &str = r#"{
  "response": {
    "header": { "resultCode": "00", "resultMsg": "NORMAL SERVICE." },
    "body": { "items": "", "numOfRows": 1000, "pageNo": 1, "totalCount": 0 }
  }
}"#;

pub const NIER_NO_DATA: &str = r#"{
  "response": { "header": { "resultCode": "03", "resultMsg": "NODATA_ERROR" } }
}"#;

pub const NIER_LIMIT_EXCEEDED: &str = r#"{
  "response": {
    "header": { "resultCode": "22", "resultMsg": "LIMITED NUMBER OF SERVICE REQUESTS EXCEEDS ERROR." }
  }
}"#;

/// `getMsrstnList` station catalog.
pub const NIER_STATION_LIST: &str = r#"{
  "getMsrstnList": {
    "header": { "code": "00", "message": "NORMAL_CODE" },
    "item": [
      { "ptNo": "1018A30", "ptNm": "팔당댐1", "addr": "경기도 남양주시 조안면 능내리", "deptNm": "한강물환경연구소" },
      { "ptNo": "1018A45", "ptNm": "노량진", "addr": "서울특별시 동작구", "deptNm": "서울특별시" }
    ],
    "numOfRows": 3000, "pageNo": 1, "totalCount": 2
  }
}"#;

/// Gateway rejection, returned as XML whatever `returnType` was asked for.
pub const PORTAL_AUTH_ERROR: &str = r#"<OpenAPI_ServiceResponse>
  <cmmMsgHeader>
    <errMsg>SERVICE ERROR</errMsg>
    <returnAuthMsg>SERVICE_KEY_IS_NOT_REGISTERED_ERROR</returnAuthMsg>
    <returnReasonCode>30</returnReasonCode>
  </cmmMsgHeader>
</OpenAPI_ServiceResponse>"#;

/// Three hourly items. `m69` (pH) is missing in the last one; `m71` holds
/// conductivity and is out of any pH range.
pub const AUTONET_SERIES: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<response>
  <header>
    <resultCode>00</resultCode>
    <resultMsg>NORMAL SERVICE.</resultMsg>
  </header>
  <body>
    <items>
      <item>
        <siteId>S01002</siteId>
        <msrDate>2024-05-01 03:00</msrDate>
        <m69>7.4</m69>
        <m70>9.8</m70>
        <m71>305</m71>
      </item>
      <item>
        <siteId>S01002</siteId>
        <msrDate>2024-05-01 04:00</msrDate>
        <m69>7.5</m69>
        <m70>9.6</m70>
        <m71>312</m71>
      </item>
      <item>
        <siteId>S01002</siteId>
        <msrDate>2024-05-01 05:00</msrDate>
        <m69/>
        <m70>9.5</m70>
        <m71>300</m71>
      </item>
    </items>
    <numOfRows>1000</numOfRows>
    <pageNo>1</pageNo>
    <totalCount>3</totalCount>
  </body>
</response>"#;

pub const AUTONET_NO_DATA: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<response>
  <header>
    <resultCode>03</resultCode>
    <resultMsg>NODATA_ERROR</resultMsg>
  </header>
  <body><items/></body>
</response>"#;
